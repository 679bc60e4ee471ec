//! Build phase: compile, package, publish.
//!
//! Three external-tool invocations in strict order - local compile, image
//! build, registry push. The first failure halts the sequence and its exit
//! code becomes the command's exit code; there is no retry and no cleanup of
//! partial state. The image reference is resolved by the caller so deploy
//! pulls exactly what build pushed.

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::image::ImageRef;
use crate::ssh::{execute_local_command_in_dir, CommandOutput};
use crate::utils::shell;

#[derive(Debug, Clone)]
pub struct BuildStep {
    pub name: &'static str,
    pub command: String,
    pub env: Vec<(String, String)>,
    pub cwd: Option<String>,
}

/// Seam for step execution so orchestration order and abort behavior are
/// testable without a toolchain.
pub trait StepRunner {
    fn run(&mut self, step: &BuildStep) -> CommandOutput;
}

/// Runs steps through the shell. Build commands need shell execution:
/// they chain tools, read environment variables, and expand paths.
pub struct ShellRunner;

impl StepRunner for ShellRunner {
    fn run(&mut self, step: &BuildStep) -> CommandOutput {
        let env_refs: Vec<(&str, &str)> = step
            .env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        execute_local_command_in_dir(
            &step.command,
            step.cwd.as_deref(),
            if env_refs.is_empty() {
                None
            } else {
                Some(&env_refs)
            },
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub name: String,
    pub command: String,
    pub exit_code: i32,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub command: String,
    pub image: String,
    pub steps: Vec<StepOutcome>,
    pub success: bool,
}

/// The build plan: compile, image build, push. Derived entirely from the
/// resolved config and image reference.
pub fn plan(config: &Config, image: &ImageRef) -> Vec<BuildStep> {
    let reference = image.reference();
    let env: Vec<(String, String)> = config
        .build
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    vec![
        BuildStep {
            name: "compile",
            command: config.build.command.clone(),
            env,
            cwd: Some(config.build.context.clone()),
        },
        BuildStep {
            name: "image",
            command: format!(
                "docker build -t {} {}",
                shell::quote_arg(&reference),
                shell::quote_path(&config.build.context)
            ),
            env: Vec::new(),
            cwd: None,
        },
        BuildStep {
            name: "push",
            command: format!("docker push {}", shell::quote_arg(&reference)),
            env: Vec::new(),
            cwd: None,
        },
    ]
}

/// Execute the build plan through the given runner, halting on the first
/// failing step.
pub fn run_steps(
    steps: &[BuildStep],
    image: &ImageRef,
    runner: &mut impl StepRunner,
) -> (BuildReport, i32) {
    let mut outcomes = Vec::with_capacity(steps.len());
    let mut exit_code = 0;

    for step in steps {
        log_status!("build", "Running {}: {}", step.name, step.command);
        let output = runner.run(step);
        let success = output.success;

        outcomes.push(StepOutcome {
            name: step.name.to_string(),
            command: step.command.clone(),
            exit_code: output.exit_code,
            success,
            stdout: output.stdout,
            stderr: output.stderr,
        });

        if !success {
            exit_code = output.exit_code;
            log_status!("build", "Step '{}' failed (exit {})", step.name, exit_code);
            break;
        }
    }

    let success = exit_code == 0;
    if success {
        log_status!("build", "Pushed {}", image.reference());
    }

    (
        BuildReport {
            command: "build.run".to_string(),
            image: image.reference(),
            steps: outcomes,
            success,
        },
        exit_code,
    )
}

/// Build entry point used by the CLI.
pub fn run(config: &Config, image: &ImageRef) -> Result<(BuildReport, i32)> {
    let steps = plan(config, image);
    Ok(run_steps(&steps, image, &mut ShellRunner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.image.repository = "acme/checkin".to_string();
        config.image.tag = "1.0.0".to_string();
        config.target.host = "deploy-host".to_string();
        config.deploy.remote_dir = "/srv/checkin".to_string();
        config.deploy.service = "checkin".to_string();
        config
    }

    fn test_image(config: &Config) -> ImageRef {
        ImageRef::from_config(&config.image, None).unwrap()
    }

    /// Records every step it is asked to run; fails the step whose name
    /// matches `fail_at` with the given exit code.
    struct RecordingRunner {
        calls: Vec<String>,
        fail_at: Option<(&'static str, i32)>,
    }

    impl RecordingRunner {
        fn passing() -> Self {
            Self {
                calls: Vec::new(),
                fail_at: None,
            }
        }

        fn failing_at(name: &'static str, exit_code: i32) -> Self {
            Self {
                calls: Vec::new(),
                fail_at: Some((name, exit_code)),
            }
        }
    }

    impl StepRunner for RecordingRunner {
        fn run(&mut self, step: &BuildStep) -> CommandOutput {
            self.calls.push(step.name.to_string());
            match self.fail_at {
                Some((name, code)) if name == step.name => CommandOutput {
                    stdout: String::new(),
                    stderr: format!("{} failed", name),
                    success: false,
                    exit_code: code,
                },
                _ => CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    success: true,
                    exit_code: 0,
                },
            }
        }
    }

    #[test]
    fn plan_orders_compile_image_push() {
        let config = test_config();
        let steps = plan(&config, &test_image(&config));
        let names: Vec<&str> = steps.iter().map(|s| s.name).collect();
        assert_eq!(names, ["compile", "image", "push"]);
    }

    #[test]
    fn plan_embeds_image_reference_in_build_and_push() {
        let config = test_config();
        let steps = plan(&config, &test_image(&config));
        assert!(steps[1].command.contains("acme/checkin:1.0.0"));
        assert!(steps[2].command.contains("acme/checkin:1.0.0"));
    }

    #[test]
    fn compile_step_carries_cross_compile_env() {
        let config = test_config();
        let steps = plan(&config, &test_image(&config));
        let compile = &steps[0];
        assert_eq!(compile.command, "go build");
        assert!(compile
            .env
            .contains(&("GOOS".to_string(), "linux".to_string())));
        assert!(compile
            .env
            .contains(&("GOARCH".to_string(), "amd64".to_string())));
    }

    #[test]
    fn all_steps_run_on_success() {
        let config = test_config();
        let image = test_image(&config);
        let steps = plan(&config, &image);
        let mut runner = RecordingRunner::passing();

        let (report, exit_code) = run_steps(&steps, &image, &mut runner);

        assert_eq!(runner.calls, ["compile", "image", "push"]);
        assert_eq!(exit_code, 0);
        assert!(report.success);
        assert_eq!(report.steps.len(), 3);
    }

    #[test]
    fn compile_failure_halts_before_image_build() {
        let config = test_config();
        let image = test_image(&config);
        let steps = plan(&config, &image);
        let mut runner = RecordingRunner::failing_at("compile", 2);

        let (report, exit_code) = run_steps(&steps, &image, &mut runner);

        assert_eq!(runner.calls, ["compile"]);
        assert_eq!(exit_code, 2);
        assert!(!report.success);
        assert_eq!(report.steps.len(), 1);
    }

    #[test]
    fn push_failure_propagates_tool_exit_code() {
        let config = test_config();
        let image = test_image(&config);
        let steps = plan(&config, &image);
        let mut runner = RecordingRunner::failing_at("push", 125);

        let (report, exit_code) = run_steps(&steps, &image, &mut runner);

        assert_eq!(runner.calls, ["compile", "image", "push"]);
        assert_eq!(exit_code, 125);
        assert!(!report.success);
        assert!(!report.steps[2].success);
    }
}
