mod session;

pub use session::{
    execute_local_command, execute_local_command_in_dir, execute_local_command_interactive,
    is_local_host, CommandOutput, RemoteSession, SshSession,
};
