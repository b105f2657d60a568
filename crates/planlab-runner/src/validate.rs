use planlab_core::config::ValidatorConfig;
use std::path::Path;
use std::process::{Command, Stdio};

/// Plan verification seam used by the instance runner.
pub trait Verifier {
    fn verify(&self, domain_file: &Path, instance_file: &Path, log_file: &Path) -> bool;
}

/// External plan validator invoked as
/// `<command...> <domain> <instance> -verify <log>`.
#[derive(Debug, Clone)]
pub struct Validator {
    command: Vec<String>,
    verify_flag: String,
    success_phrase: String,
}

impl Validator {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            command: config.command.clone(),
            verify_flag: config.verify_flag.clone(),
            success_phrase: config.success_phrase.clone(),
        }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// True iff the verifier's stripped output carries the success phrase.
    /// Spawn failures and crashes count as an invalid plan.
    pub fn validate(&self, domain_file: &Path, instance_file: &Path, log_file: &Path) -> bool {
        if self.command.is_empty() {
            tracing::warn!("validator command is empty; treating plan as invalid");
            return false;
        }
        let output = Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(domain_file)
            .arg(instance_file)
            .arg(&self.verify_flag)
            .arg(log_file)
            .stdin(Stdio::null())
            .output();
        let output = match output {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "validator failed to start");
                return false;
            }
        };
        let mut captured = output.stdout;
        captured.extend_from_slice(&output.stderr);
        let text = strip_ansi(&String::from_utf8_lossy(&captured));
        let valid = text.contains(&self.success_phrase);
        tracing::debug!(log = %log_file.display(), valid, "validator verdict");
        valid
    }
}

impl Verifier for Validator {
    fn verify(&self, domain_file: &Path, instance_file: &Path, log_file: &Path) -> bool {
        self.validate(domain_file, instance_file, log_file)
    }
}

/// Removes terminal control sequences (CSI, OSC and two-byte escapes).
pub fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\u{1b}' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('[') => {
                chars.next();
                // parameters and intermediates up to the final byte
                for c in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\u{07}' {
                        break;
                    }
                    if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            Some(_) => {
                chars.next();
            }
            None => {}
        }
    }
    out
}
