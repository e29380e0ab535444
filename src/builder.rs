//! Request/response types for the exec endpoints (`/containers/{id}/exec`, `/exec/{id}/...`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Error, Result};

/// Options used to create an exec instance via `POST /containers/{id}/exec`.
#[derive(Serialize, Debug, Default)]
pub struct ExecContainerOptions {
    params: HashMap<&'static str, Value>,
}

impl ExecContainerOptions {
    pub fn builder() -> ExecContainerOptionsBuilder {
        ExecContainerOptionsBuilder::new()
    }

    pub(crate) fn serialize(&self) -> Result<String> {
        serde_json::to_string(&self.params).map_err(Error::from)
    }
}

#[derive(Default)]
pub struct ExecContainerOptionsBuilder {
    params: HashMap<&'static str, Value>,
}

impl ExecContainerOptionsBuilder {
    pub(crate) fn new() -> Self {
        let mut params = HashMap::new();
        params.insert("AttachStdout", Value::Bool(true));
        params.insert("AttachStderr", Value::Bool(true));
        ExecContainerOptionsBuilder { params }
    }

    /// The command to run, as argv.
    pub fn cmd(
        &mut self,
        cmd: Vec<&str>,
    ) -> &mut Self {
        self.params.insert(
            "Cmd",
            Value::Array(cmd.into_iter().map(|s| Value::String(s.to_owned())).collect()),
        );
        self
    }

    /// Environment variables in `KEY=value` form.
    pub fn env<E>(
        &mut self,
        env: E,
    ) -> &mut Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        self.params.insert(
            "Env",
            Value::Array(
                env.into_iter()
                    .map(|e| Value::String(e.as_ref().to_owned()))
                    .collect(),
            ),
        );
        self
    }

    /// Attach a pseudo-TTY to the exec session.
    pub fn tty(
        &mut self,
        tty: bool,
    ) -> &mut Self {
        self.params.insert("Tty", Value::Bool(tty));
        self
    }

    /// Attach stdin for interactive sessions.
    pub fn attach_stdin(
        &mut self,
        attach: bool,
    ) -> &mut Self {
        self.params.insert("AttachStdin", Value::Bool(attach));
        self
    }

    pub fn privileged(
        &mut self,
        privileged: bool,
    ) -> &mut Self {
        self.params.insert("Privileged", Value::Bool(privileged));
        self
    }

    /// `user`, `user:group`, `uid`, or `uid:gid`.
    pub fn user(
        &mut self,
        user: &str,
    ) -> &mut Self {
        self.params
            .insert("User", Value::String(user.to_owned()));
        self
    }

    pub fn working_dir(
        &mut self,
        dir: &str,
    ) -> &mut Self {
        self.params
            .insert("WorkingDir", Value::String(dir.to_owned()));
        self
    }

    pub fn build(&self) -> ExecContainerOptions {
        ExecContainerOptions {
            params: self.params.clone(),
        }
    }
}

/// Response of `GET /exec/{id}/json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecDetails {
    pub can_remove: bool,
    #[serde(rename = "ContainerID")]
    pub container_id: String,
    pub detach_keys: String,
    pub exit_code: Option<u64>,
    #[serde(rename = "ID")]
    pub id: String,
    pub open_stderr: bool,
    pub open_stdin: bool,
    pub open_stdout: bool,
    pub process_config: ProcessConfig,
    pub running: bool,
    pub pid: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub arguments: Vec<String>,
    pub entrypoint: String,
    pub privileged: bool,
    pub tty: bool,
    pub user: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_exec_options_attach_stdout_and_stderr() {
        let opts = ExecContainerOptions::builder().build();
        let json: Value = serde_json::from_str(&opts.serialize().unwrap()).unwrap();
        assert_eq!(json["AttachStdout"], Value::Bool(true));
        assert_eq!(json["AttachStderr"], Value::Bool(true));
    }

    #[test]
    fn cmd_and_env_are_set() {
        let opts = ExecContainerOptions::builder()
            .cmd(vec!["echo", "hi"])
            .env(vec!["FOO=bar"])
            .build();
        let json: Value = serde_json::from_str(&opts.serialize().unwrap()).unwrap();
        assert_eq!(json["Cmd"], serde_json::json!(["echo", "hi"]));
        assert_eq!(json["Env"], serde_json::json!(["FOO=bar"]));
    }
}
