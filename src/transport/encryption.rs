//! Stream encryption through an external cipher command

use crate::config::EncryptionConfig;
use crate::utils::cancel::CancellationToken;
use crate::utils::command::{CommandSpec, CommandStream};
use crate::utils::executor::CommandExecutor;
use anyhow::{Context, Result};
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

/// Environment variable carrying the passphrase to the cipher command
pub const PASSPHRASE_ENV: &str = "BACKUP_ENCRYPTION_PASSPHRASE";

/// Encrypts archives on the way out and decrypts them on the way in.
///
/// Without a configuration both directions pass the stream through untouched.
#[derive(Clone)]
pub struct Encryption {
    config: Option<EncryptionConfig>,
    executor: Arc<dyn CommandExecutor>,
}

impl Encryption {
    pub fn new(config: Option<EncryptionConfig>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { config, executor }
    }

    fn command(config: &EncryptionConfig, decrypt: bool) -> CommandSpec {
        let custom = if decrypt {
            config.decrypt_cmd.as_deref()
        } else {
            config.encrypt_cmd.as_deref()
        };

        let spec = match custom {
            Some(cmd) => CommandSpec::shell(cmd),
            None => {
                let spec = CommandSpec::new("openssl").args([
                    "enc".to_string(),
                    format!("-{}", config.method),
                    "-pbkdf2".to_string(),
                    "-salt".to_string(),
                    "-pass".to_string(),
                    format!("env:{}", PASSPHRASE_ENV),
                ]);
                if decrypt {
                    spec.arg("-d")
                } else {
                    spec
                }
            }
        };

        spec.env(PASSPHRASE_ENV, config.passphrase.expose())
    }

    fn pipe(
        &self,
        input: Box<dyn Read + Send>,
        decrypt: bool,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Read + Send>> {
        let Some(ref config) = self.config else {
            return Ok(input);
        };

        let spec = Self::command(config, decrypt);
        debug!("Piping archive through: {}", spec);

        let execution = self
            .executor
            .spawn(&spec, Some(input), true)
            .context(if decrypt {
                "Failed to start decryption"
            } else {
                "Failed to start encryption"
            })?;
        let (stream, _) = CommandStream::new(execution);
        if let Some(killer) = stream.killer() {
            cancel.register(killer);
        }

        Ok(Box::new(stream))
    }

    /// Encrypt a backup stream
    pub fn wrap(&self, input: Box<dyn Read + Send>, cancel: &CancellationToken) -> Result<Box<dyn Read + Send>> {
        self.pipe(input, false, cancel)
    }

    /// Decrypt a stream read back from storage
    pub fn unwrap(&self, input: Box<dyn Read + Send>, cancel: &CancellationToken) -> Result<Box<dyn Read + Send>> {
        self.pipe(input, true, cancel)
    }
}
