//! Deploy phase: pull, upload, apply, follow.
//!
//! All four steps share one remote session. The session is acquired before
//! the first step and released on every exit path; a failed step aborts the
//! remainder but still closes the connection. The final log-follow blocks
//! until the operator interrupts it - that interruption is the command's
//! normal termination, not an error.

use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::image::ImageRef;
use crate::ssh::{RemoteSession, SshSession};
use crate::utils::shell;

/// Exit code a pty-allocated remote command reports when the operator
/// interrupts it with Ctrl-C.
const SIGINT_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployStepOutcome {
    pub name: String,
    pub command: String,
    pub exit_code: i32,
    pub success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub command: String,
    pub image: String,
    pub target: String,
    pub steps: Vec<DeployStepOutcome>,
    pub success: bool,
}

/// The remote commands for one deploy, derived once from config so the
/// upload destination and the apply command reference the same path.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub pull_command: String,
    pub compose_file: String,
    pub remote_compose_path: String,
    pub apply_command: String,
    pub follow_command: String,
}

pub fn plan(config: &Config, image: &ImageRef) -> Result<DeployPlan> {
    let compose_file = &config.deploy.compose_file;
    let file_name = Path::new(compose_file)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            Error::config_invalid_value(
                "deploy.composeFile",
                Some(compose_file.clone()),
                "Compose file path must include a file name",
            )
        })?;

    let remote_dir = config.deploy.remote_dir.trim_end_matches('/');
    let remote_compose_path = format!("{}/{}", remote_dir, file_name);

    Ok(DeployPlan {
        pull_command: format!("docker pull {}", shell::quote_arg(&image.reference())),
        compose_file: compose_file.clone(),
        remote_compose_path: remote_compose_path.clone(),
        apply_command: format!(
            "cd {} && docker compose -f {} up -d",
            shell::quote_path(remote_dir),
            shell::quote_arg(file_name)
        ),
        follow_command: format!("docker logs -f {}", shell::quote_arg(&config.deploy.service)),
    })
}

/// Run the deploy steps over an established session and close it. Closing
/// here (rather than relying on drop order) keeps the release observable:
/// exactly one close per invocation on every path.
pub fn run_session(
    session: &mut impl RemoteSession,
    config: &Config,
    plan: &DeployPlan,
    image: &ImageRef,
    follow: bool,
) -> (DeployReport, i32) {
    let (steps, exit_code) = run_steps(session, config, plan, follow);
    session.close();

    let report = DeployReport {
        command: "deploy.run".to_string(),
        image: image.reference(),
        target: format!("{}@{}", config.target.user, config.target.host),
        steps,
        success: exit_code == 0,
    };

    (report, exit_code)
}

fn run_steps(
    session: &mut impl RemoteSession,
    config: &Config,
    plan: &DeployPlan,
    follow: bool,
) -> (Vec<DeployStepOutcome>, i32) {
    let mut steps = Vec::new();

    // Step 1: pull the published image on the target.
    log_status!("deploy", "Pulling image on {}", config.target.host);
    let pull_code = session.run_interactive(&plan.pull_command);
    steps.push(DeployStepOutcome {
        name: "pull".to_string(),
        command: plan.pull_command.clone(),
        exit_code: pull_code,
        success: pull_code == 0,
    });
    if pull_code != 0 {
        return (steps, pull_code);
    }

    // Step 2: upload the compose file, overwriting the previous one.
    log_status!(
        "deploy",
        "Uploading {} to {}",
        plan.compose_file,
        plan.remote_compose_path
    );
    let remote_dir = config.deploy.remote_dir.trim_end_matches('/');
    let mkdir = session.run(&format!("mkdir -p {}", shell::quote_path(remote_dir)));
    let upload = if mkdir.success {
        session.upload(&plan.compose_file, &plan.remote_compose_path)
    } else {
        mkdir
    };
    let upload_command = format!("upload {} -> {}", plan.compose_file, plan.remote_compose_path);
    steps.push(DeployStepOutcome {
        name: "upload".to_string(),
        command: upload_command,
        exit_code: upload.exit_code,
        success: upload.success,
    });
    if !upload.success {
        log_status!("deploy", "Upload failed: {}", upload.stderr.trim());
        return (steps, upload.exit_code);
    }

    // Step 3: apply the composition, detached.
    log_status!("deploy", "Applying {}", plan.remote_compose_path);
    let apply_code = session.run_interactive(&plan.apply_command);
    steps.push(DeployStepOutcome {
        name: "apply".to_string(),
        command: plan.apply_command.clone(),
        exit_code: apply_code,
        success: apply_code == 0,
    });
    if apply_code != 0 {
        return (steps, apply_code);
    }

    // Step 4: follow the service logs until the operator cancels.
    if follow {
        log_status!(
            "deploy",
            "Following logs for '{}' (Ctrl-C to stop)",
            config.deploy.service
        );
        let follow_code = session.run_interactive(&plan.follow_command);
        let cancelled = follow_code == SIGINT_EXIT_CODE;
        let success = follow_code == 0 || cancelled;
        steps.push(DeployStepOutcome {
            name: "follow".to_string(),
            command: plan.follow_command.clone(),
            exit_code: follow_code,
            success,
        });
        if !success {
            return (steps, follow_code);
        }
    }

    (steps, 0)
}

/// Deploy entry point used by the CLI.
pub fn run(config: &Config, image: &ImageRef, follow: bool) -> Result<(DeployReport, i32)> {
    let plan = plan(config, image)?;

    if !Path::new(&plan.compose_file).exists() {
        return Err(Error::validation_invalid_argument(
            "composeFile",
            "Compose file does not exist",
            Some(plan.compose_file.clone()),
        )
        .with_hint("Check deploy.composeFile in the configuration"));
    }

    let mut session = SshSession::connect(&config.target)?;
    Ok(run_session(&mut session, config, &plan, image, follow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ssh::CommandOutput;

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

    #[derive(Default)]
    struct FakeSession {
        calls: Vec<String>,
        close_count: usize,
        fail_command_containing: Option<(&'static str, i32)>,
        follow_exit_code: i32,
    }

    impl FakeSession {
        fn exit_code_for(&self, command: &str) -> i32 {
            match self.fail_command_containing {
                Some((needle, code)) if command.contains(needle) => code,
                _ => 0,
            }
        }
    }

    impl RemoteSession for FakeSession {
        fn run(&mut self, command: &str) -> CommandOutput {
            self.calls.push(format!("run: {}", command));
            let exit_code = self.exit_code_for(command);
            CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                success: exit_code == 0,
                exit_code,
            }
        }

        fn run_interactive(&mut self, command: &str) -> i32 {
            self.calls.push(format!("interactive: {}", command));
            if command.starts_with("docker logs") {
                return self.follow_exit_code;
            }
            self.exit_code_for(command)
        }

        fn upload(&mut self, local_path: &str, remote_path: &str) -> CommandOutput {
            self.calls
                .push(format!("upload: {} -> {}", local_path, remote_path));
            let exit_code = self.exit_code_for(remote_path);
            CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                success: exit_code == 0,
                exit_code,
            }
        }

        fn close(&mut self) {
            self.close_count += 1;
        }
    }

    fn run_fake(config: &Config, session: &mut FakeSession, follow: bool) -> (DeployReport, i32) {
        let image = test_image(config);
        let plan = plan(config, &image).unwrap();
        run_session(session, config, &plan, &image, follow)
    }

    #[test]
    fn steps_run_in_order_and_close_once() {
        let config = test_config();
        let mut session = FakeSession {
            follow_exit_code: SIGINT_EXIT_CODE,
            ..Default::default()
        };

        let (report, exit_code) = run_fake(&config, &mut session, true);

        assert_eq!(exit_code, 0);
        assert!(report.success);
        assert_eq!(session.close_count, 1);

        let names: Vec<&str> = report.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["pull", "upload", "apply", "follow"]);

        assert!(session.calls[0].contains("docker pull acme/checkin:1.0.0"));
        assert!(session.calls[1].contains("mkdir -p"));
        assert!(session.calls[2].starts_with("upload: docker-compose.yml"));
        assert!(session.calls[3].contains("docker compose -f"));
        assert!(session.calls[4].contains("docker logs -f"));
    }

    #[test]
    fn pull_failure_aborts_before_upload_and_still_closes() {
        let config = test_config();
        let mut session = FakeSession {
            fail_command_containing: Some(("docker pull", 1)),
            ..Default::default()
        };

        let (report, exit_code) = run_fake(&config, &mut session, true);

        assert_eq!(exit_code, 1);
        assert!(!report.success);
        assert_eq!(session.close_count, 1);
        assert_eq!(report.steps.len(), 1);
        assert!(!session.calls.iter().any(|c| c.starts_with("upload:")));
    }

    #[test]
    fn upload_failure_aborts_before_apply_and_still_closes() {
        let config = test_config();
        let mut session = FakeSession {
            fail_command_containing: Some(("docker-compose.yml", 3)),
            ..Default::default()
        };

        let (report, exit_code) = run_fake(&config, &mut session, true);

        assert_eq!(exit_code, 3);
        assert_eq!(session.close_count, 1);
        assert_eq!(report.steps.len(), 2);
        assert!(!session
            .calls
            .iter()
            .any(|c| c.contains("docker compose -f")));
    }

    #[test]
    fn apply_failure_aborts_before_follow_and_still_closes() {
        let config = test_config();
        let mut session = FakeSession {
            fail_command_containing: Some(("up -d", 2)),
            ..Default::default()
        };

        let (report, exit_code) = run_fake(&config, &mut session, true);

        assert_eq!(exit_code, 2);
        assert_eq!(session.close_count, 1);
        assert_eq!(report.steps.len(), 3);
        assert!(!session.calls.iter().any(|c| c.contains("docker logs")));
    }

    #[test]
    fn operator_cancellation_of_follow_is_clean_exit() {
        let config = test_config();
        let mut session = FakeSession {
            follow_exit_code: SIGINT_EXIT_CODE,
            ..Default::default()
        };

        let (report, exit_code) = run_fake(&config, &mut session, true);

        assert_eq!(exit_code, 0);
        assert!(report.success);
        let follow = report.steps.last().unwrap();
        assert_eq!(follow.exit_code, SIGINT_EXIT_CODE);
        assert!(follow.success);
    }

    #[test]
    fn follow_error_exit_is_distinguishable_from_cancellation() {
        let config = test_config();
        let mut session = FakeSession {
            follow_exit_code: 1,
            ..Default::default()
        };

        let (report, exit_code) = run_fake(&config, &mut session, true);

        assert_eq!(exit_code, 1);
        assert!(!report.success);
        assert_eq!(session.close_count, 1);
    }

    #[test]
    fn no_follow_skips_log_step() {
        let config = test_config();
        let mut session = FakeSession::default();

        let (report, exit_code) = run_fake(&config, &mut session, false);

        assert_eq!(exit_code, 0);
        assert_eq!(report.steps.len(), 3);
        assert!(!session.calls.iter().any(|c| c.contains("docker logs")));
    }

    #[test]
    fn upload_destination_matches_apply_command() {
        let config = test_config();
        let image = test_image(&config);
        let deploy_plan = plan(&config, &image).unwrap();

        assert_eq!(
            deploy_plan.remote_compose_path,
            "/srv/checkin/docker-compose.yml"
        );
        assert!(deploy_plan.apply_command.contains("'/srv/checkin'"));
        assert!(deploy_plan.apply_command.contains("docker-compose.yml"));
    }

    #[test]
    fn pull_references_exact_build_tag() {
        // The invariant across phases: one config, one image reference.
        let config = test_config();
        let image = test_image(&config);
        let build_steps = crate::build::plan(&config, &image);
        let deploy_plan = plan(&config, &image).unwrap();

        let pushed = &build_steps[2].command;
        assert!(pushed.contains("acme/checkin:1.0.0"));
        assert!(deploy_plan.pull_command.contains("acme/checkin:1.0.0"));
    }
}
