//! Process Spawner (C1).
//!
//! New tokio-process rewrite of `meticulous-worker/src/executor.rs`'s
//! `Executor::start`: kept the "two independent captured streams, no
//! callback on process exit" shape and the `.ps1` scripting-engine
//! special case from spec §4.1. Dropped the teacher's raw `clone3`/
//! namespace-sandboxing path; this agent runs jobs directly under the
//! host OS, not inside a container layer.

use crate::error::{AgentError, Result};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Windows PowerShell scripts aren't directly executable; rewrite the
/// invocation to go through the script host the same way a shell would
/// via file association. Pure function so the rewrite rule is testable
/// without actually spawning anything.
pub fn rewrite_for_script_host(program_name: &str, args: &[String]) -> (String, Vec<String>) {
    if program_name.to_ascii_lowercase().ends_with(".ps1") {
        let mut rewritten = vec![
            "-NoProfile".to_string(),
            "-ExecutionPolicy".to_string(),
            "Bypass".to_string(),
            "-File".to_string(),
            program_name.to_string(),
        ];
        rewritten.extend(args.iter().cloned());
        ("powershell".to_string(), rewritten)
    } else {
        (program_name.to_string(), args.to_vec())
    }
}

pub struct Spawner;

impl Spawner {
    /// Spawn `program_name` with `args`, capturing stdout and stderr as
    /// pipes for the Line Pump to read. Stdin is closed immediately: jobs
    /// are not interactive.
    pub fn spawn(program_name: &str, args: &[String]) -> Result<Child> {
        let (program, args) = rewrite_for_script_host(program_name, args);
        Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AgentError::SpawnFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_ordinary_programs_untouched() {
        let (program, args) = rewrite_for_script_host("ls", &["-la".to_string()]);
        assert_eq!(program, "ls");
        assert_eq!(args, vec!["-la".to_string()]);
    }

    #[test]
    fn rewrites_ps1_through_powershell() {
        let (program, args) = rewrite_for_script_host("deploy.ps1", &["-Verbose".to_string()]);
        assert_eq!(program, "powershell");
        assert!(args.contains(&"-File".to_string()));
        assert!(args.contains(&"deploy.ps1".to_string()));
        assert_eq!(args.last(), Some(&"-Verbose".to_string()));
    }

    #[test]
    fn script_host_rewrite_is_case_insensitive() {
        let (program, _) = rewrite_for_script_host("Deploy.PS1", &[]);
        assert_eq!(program, "powershell");
    }

    #[tokio::test]
    async fn spawn_failure_surfaces_as_spawn_failed() {
        let err = Spawner::spawn("definitely-not-a-real-binary-xyz", &[]).unwrap_err();
        assert!(matches!(err, AgentError::SpawnFailed(_)));
    }
}
