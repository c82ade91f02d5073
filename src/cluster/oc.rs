// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cluster access through the `oc` binary.
//!
//! Each [`ClusterApi`] call is a single blocking `oc` invocation. When a
//! kubeconfig path is configured, it is passed to every invocation via
//! `--kubeconfig` instead of relying on the `KUBECONFIG` environment
//! variable.

use crate::{
    cluster::{ClusterApi, ClusterError, Deletion, ObjectRef, Result, WaitStatus},
    config::RoleBindingSettings,
};

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::{OsStr, OsString},
    io::{ErrorKind, Write},
    path::PathBuf,
    process::{Command, Stdio},
    time::Duration,
};
use tracing::{debug, instrument};

/// Cluster access through the `oc` command-line interface.
#[derive(Debug, Clone)]
pub struct OcCli {
    binary: String,
    kubeconfig: Option<PathBuf>,
}

impl OcCli {
    /// Construct new `oc` client.
    pub fn new(binary: impl Into<String>, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            kubeconfig,
        }
    }

    fn expand_bin_args(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Vec<OsString> {
        let mut bin_args: Vec<OsString> = Vec::new();
        if let Some(kubeconfig) = &self.kubeconfig {
            bin_args.push("--kubeconfig".into());
            bin_args.push(kubeconfig.as_os_str().to_owned());
        }
        bin_args.extend(args.into_iter().map(Into::into));

        bin_args
    }

    fn occall(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
        stdin: Option<&str>,
    ) -> Result<Output> {
        syscall(&self.binary, self.expand_bin_args(args), stdin)
    }

    fn occall_checked(
        &self,
        args: impl IntoIterator<Item = impl Into<OsString>>,
        stdin: Option<&str>,
    ) -> Result<String> {
        let output = self.occall(args, stdin)?;
        if !output.success {
            return Err(output.into_error(&self.binary));
        }

        Ok(output.stdout)
    }
}

impl ClusterApi for OcCli {
    #[instrument(skip(self), level = "debug")]
    fn check_tool(&self) -> Result<()> {
        match self.occall(["version", "--client"], None) {
            Err(ClusterError::Syscall(err)) if err.kind() == ErrorKind::NotFound => {
                Err(ClusterError::MissingTool {
                    source: err,
                    binary: self.binary.clone(),
                })
            }
            Err(err) => Err(err),
            Ok(output) if !output.success => Err(output.into_error(&self.binary)),
            Ok(_) => Ok(()),
        }
    }

    #[instrument(skip(self), level = "debug")]
    fn whoami(&self) -> Result<String> {
        let output = self.occall(["whoami"], None)?;
        if !output.success {
            return Err(ClusterError::NotAuthenticated {
                message: chomp(output.stderr),
            });
        }

        Ok(chomp(output.stdout))
    }

    #[instrument(skip(self), level = "debug")]
    fn list_names(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<String>> {
        let mut args = vec!["get", kind, "-o", "name"];
        if let Some(namespace) = namespace {
            args.extend(["-n", namespace]);
        }
        let stdout = self.occall_checked(args, None)?;

        Ok(parse_names(&stdout))
    }

    #[instrument(skip(self), level = "debug")]
    fn get_object(&self, object: &ObjectRef<'_>) -> Result<Option<String>> {
        let mut args = vec!["get", object.kind, object.name, "-o", "json", "--ignore-not-found"];
        if let Some(namespace) = object.namespace {
            args.extend(["-n", namespace]);
        }
        let stdout = self.occall_checked(args, None)?;
        if stdout.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(stdout))
    }

    #[instrument(skip(self), level = "debug")]
    fn delete(&self, object: &ObjectRef<'_>) -> Result<Deletion> {
        let mut args = vec![
            "delete",
            object.kind,
            object.name,
            "--ignore-not-found",
            "--wait=false",
        ];
        if let Some(namespace) = object.namespace {
            args.extend(["-n", namespace]);
        }
        let stdout = self.occall_checked(args, None)?;
        debug!("{}", chomp(stdout.clone()));

        // INVARIANT: With --ignore-not-found, oc prints nothing for absent objects.
        if stdout.trim().is_empty() {
            return Ok(Deletion::AlreadyAbsent);
        }

        Ok(Deletion::Deleted)
    }

    #[instrument(skip(self), level = "debug")]
    fn wait_for_deletion(&self, object: &ObjectRef<'_>, timeout: Duration) -> Result<WaitStatus> {
        let style = ProgressStyle::with_template("{spinner:.yellow} {elapsed_precise:.green}  {msg}")?;
        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.set_message(format!("waiting for {object} to disappear"));
        bar.enable_steady_tick(Duration::from_millis(100));

        let target = format!("{}/{}", object.kind, object.name);
        let timeout = format!("--timeout={}s", timeout.as_secs());
        let mut args = vec!["wait", "--for=delete", target.as_str(), timeout.as_str()];
        if let Some(namespace) = object.namespace {
            args.extend(["-n", namespace]);
        }
        let output = self.occall(args, None);
        bar.finish_and_clear();
        let output = output?;

        if output.success {
            return Ok(WaitStatus::Gone);
        }

        match classify_wait_failure(&output.stderr) {
            Some(status) => Ok(status),
            None => Err(output.into_error(&self.binary)),
        }
    }

    #[instrument(skip(self, manifest), level = "debug")]
    fn replace(&self, manifest: &str) -> Result<()> {
        let stdout = self.occall_checked(["replace", "-f", "-"], Some(manifest))?;
        debug!("{}", chomp(stdout));

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn patch_merge(&self, object: &ObjectRef<'_>, patch: &str) -> Result<()> {
        let mut args = vec!["patch", object.kind, object.name, "--type", "merge", "-p", patch];
        if let Some(namespace) = object.namespace {
            args.extend(["-n", namespace]);
        }
        let stdout = self.occall_checked(args, None)?;
        debug!("{}", chomp(stdout));

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn grant_cluster_role(&self, binding: &RoleBindingSettings) -> Result<()> {
        let rolebinding_name = format!("--rolebinding-name={}", binding.name);
        let stdout = self.occall_checked(
            [
                "adm",
                "policy",
                "add-cluster-role-to-group",
                binding.cluster_role.as_str(),
                binding.group.as_str(),
                rolebinding_name.as_str(),
            ],
            None,
        )?;
        debug!("{}", chomp(stdout));

        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
struct Output {
    success: bool,
    stdout: String,
    stderr: String,
}

impl Output {
    fn into_error(self, cmd: &str) -> ClusterError {
        let mut message = String::new();
        if !self.stdout.is_empty() {
            message.push_str(format!("stdout: {}", self.stdout).as_str());
        }

        if !self.stderr.is_empty() {
            message.push_str(format!("stderr: {}", self.stderr).as_str());
        }

        ClusterError::Command {
            command: cmd.to_string(),
            message: chomp(message),
        }
    }
}

fn syscall(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
    stdin: Option<&str>,
) -> Result<Output> {
    let mut command = Command::new(cmd.as_ref());
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!("run {command:?}");

    let mut child = command.spawn()?;
    let written = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => pipe.write_all(input.as_bytes()),
        _ => Ok(()),
    };
    let output = child.wait_with_output()?;
    let output = Output {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
        stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
    };

    // INVARIANT: A child that failed explains itself better than a broken pipe.
    match written {
        Err(err) if output.success => Err(err.into()),
        _ => Ok(output),
    }
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}

/// Strip the `type/` prefix that `oc get -o name` puts on every line.
fn parse_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.rsplit_once('/') {
            Some((_, name)) => name.to_string(),
            None => line.to_string(),
        })
        .collect()
}

/// Decide whether a failed `oc wait --for=delete` still answers the question.
fn classify_wait_failure(stderr: &str) -> Option<WaitStatus> {
    let stderr = stderr.to_lowercase();
    if stderr.contains("not found") || stderr.contains("notfound") {
        return Some(WaitStatus::Gone);
    }

    if stderr.contains("timed out") {
        return Some(WaitStatus::TimedOut);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test]
    fn parse_names_strips_type_prefix() {
        let stdout = indoc! {"
            namespace/default
            namespace/ns1

            template.template.openshift.io/httpd-example
            bare-name
        "};
        let result = parse_names(stdout);
        let expect = vec![
            "default".to_string(),
            "ns1".to_string(),
            "httpd-example".to_string(),
            "bare-name".to_string(),
        ];
        assert_eq!(result, expect);
    }

    #[test_case("Error from server (NotFound): namespaces \"ns2\" not found", Some(WaitStatus::Gone); "already gone")]
    #[test_case("error: timed out waiting for the condition on namespaces/ns2", Some(WaitStatus::TimedOut); "timeout")]
    #[test_case("error: You must be logged in to the server (Unauthorized)", None; "unrelated failure")]
    #[test]
    fn wait_failure_classification(stderr: &str, expect: Option<WaitStatus>) {
        pretty_assertions::assert_eq!(classify_wait_failure(stderr), expect);
    }

    #[test]
    fn kubeconfig_is_passed_first() {
        let client = OcCli::new("oc", Some(PathBuf::from("/tmp/kubeconfig")));
        let result = client.expand_bin_args(["whoami"]);
        let expect: Vec<OsString> = vec!["--kubeconfig".into(), "/tmp/kubeconfig".into(), "whoami".into()];
        assert_eq!(result, expect);

        let client = OcCli::new("oc", None);
        let result = client.expand_bin_args(["whoami"]);
        let expect: Vec<OsString> = vec!["whoami".into()];
        assert_eq!(result, expect);
    }

    #[test]
    fn missing_binary_is_reported() {
        let client = OcCli::new("ocrevert-test-no-such-binary", None);
        let result = client.check_tool();
        assert!(matches!(result, Err(ClusterError::MissingTool { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn early_exit_keeps_child_diagnosis() -> anyhow::Result<()> {
        let manifest = "x".repeat(1 << 20);
        let result = syscall(
            "sh",
            ["-c", "echo 'error: the server rejected the manifest' >&2; exit 3"],
            Some(manifest.as_str()),
        )?;
        assert!(!result.success);

        let result = result.into_error("oc").to_string();
        assert_eq!(
            result,
            "command \"oc\" failed:\nstderr: error: the server rejected the manifest"
        );

        Ok(())
    }

    #[test]
    fn command_error_names_binary_and_streams() {
        let output = Output {
            success: false,
            stdout: String::new(),
            stderr: "error: forbidden\n".into(),
        };
        let result = output.into_error("oc").to_string();
        assert_eq!(result, "command \"oc\" failed:\nstderr: error: forbidden");
    }
}
