use planlab_core::ToolError;
use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Checks that `command` can be launched: the program resolves to an
/// executable file and a script operand (e.g. `sh ./solver.sh`) exists.
pub fn ensure_tool_available(role: &str, command: &[String]) -> Result<(), ToolError> {
    let unavailable = |reason: String| ToolError::Unavailable {
        role: role.to_string(),
        command: command.to_vec(),
        reason,
    };
    let program = command
        .first()
        .ok_or_else(|| unavailable("no command configured".to_string()))?;
    let resolved = resolve_program(program)
        .ok_or_else(|| unavailable(format!("{} is not an executable file or on PATH", program)))?;
    if !is_executable(&resolved) {
        return Err(unavailable(format!("{} is not executable", resolved.display())));
    }
    if let Some(script) = script_operand(command) {
        if !Path::new(script).is_file() {
            return Err(unavailable(format!("script {} not found", script)));
        }
    }
    Ok(())
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return path.is_file().then_some(path);
    }
    let search = env::var_os("PATH")?;
    env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn script_operand(command: &[String]) -> Option<&str> {
    let candidate = command.get(1)?;
    if candidate.starts_with('-') {
        return None;
    }
    command_part_looks_like_path(candidate).then_some(candidate.as_str())
}

fn command_part_looks_like_path(part: &str) -> bool {
    part.starts_with('.')
        || part.starts_with('/')
        || part.contains('/')
        || part.ends_with(".py")
        || part.ends_with(".sh")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn path_lookup_finds_shell() {
        ensure_tool_available("solver", &cmd(&["sh", "-c", "true"])).unwrap();
    }

    #[test]
    fn missing_program_is_unavailable() {
        let err = ensure_tool_available("validator", &cmd(&["planlab-no-such-validator"]))
            .unwrap_err();
        assert!(err.to_string().contains("validator"), "{}", err);
        assert!(ensure_tool_available("solver", &[]).is_err());
    }

    #[test]
    fn missing_script_operand_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("solver.sh");
        let command = cmd(&["sh", &script.display().to_string()]);
        assert!(ensure_tool_available("solver", &command).is_err());
        std::fs::write(&script, "exit 0\n").unwrap();
        ensure_tool_available("solver", &command).unwrap();
    }

    #[test]
    fn non_executable_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("lilotane");
        std::fs::write(&binary, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = ensure_tool_available("solver", &cmd(&[&binary.display().to_string()]))
            .unwrap_err();
        assert!(err.to_string().contains("not executable"), "{}", err);
    }
}
