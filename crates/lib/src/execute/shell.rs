//! Local step executor.
//!
//! Genrule commands run through a shell in an isolated environment: the host
//! environment is cleared except for `PATH`, and the rule's variables are
//! layered on top. Prebuilt kinds copy their input into the output directory;
//! aar unpacking shells out to `unzip`.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::cache::BuildOutput;
use crate::rules::RuleKind;
use crate::source::SourcePath;
use crate::util::fs::{copy_path, remove_path};
use crate::util::hash::hash_path;

use super::env::srcdir;
use super::types::{StepError, StepExecutor, StepRequest};

/// Subdirectory of a rule's output directory used as the command's temp dir.
const TMP_DIR_NAME: &str = "__tmp";

#[derive(Debug, Clone, Default)]
pub struct ShellStepExecutor {
  shell: Option<String>,
}

impl ShellStepExecutor {
  pub fn new(shell: Option<String>) -> Self {
    Self { shell }
  }
}

impl StepExecutor for ShellStepExecutor {
  async fn execute(&self, request: StepRequest) -> Result<BuildOutput, StepError> {
    let rule = request.rule.clone();
    match rule.kind() {
      RuleKind::Genrule(genrule) => self.run_genrule(&request, &genrule.cmd, &genrule.srcs).await,
      RuleKind::ApkGenrule(apk) => self.run_genrule(&request, &apk.genrule.cmd, &apk.genrule.srcs).await,
      RuleKind::PrebuiltJar(jar) => copy_input(&request, &jar.binary_jar).await,
      RuleKind::PrebuiltDotnetLibrary(lib) => copy_input(&request, &lib.assembly).await,
      RuleKind::UnzipAar(unzip) => unzip_aar(&request, &unzip.aar).await,
      _ => Err(StepError::Unsupported(rule.type_name())),
    }
  }
}

impl ShellStepExecutor {
  async fn run_genrule(&self, request: &StepRequest, cmd: &str, srcs: &[SourcePath]) -> Result<BuildOutput, StepError> {
    let out = expected_output(request)?;
    prepare_output_dir(&request.output_dir).await?;

    let src_dir = srcdir(&request.output_dir);
    let mut copies = Vec::with_capacity(srcs.len());
    for src in srcs {
      let from = request.resolved_path(src)?.to_path_buf();
      let name = src.file_name().unwrap_or_else(|| src.to_string());
      copies.push((from, src_dir.join(name)));
    }
    blocking(move || {
      std::fs::create_dir_all(&src_dir).map_err(StepError::io(&src_dir))?;
      for (from, to) in copies {
        copy_path(&from, &to).map_err(StepError::io(&from))?;
      }
      Ok(())
    })
    .await?;

    execute_cmd(
      cmd,
      &request.env,
      &request.project_root,
      &request.output_dir,
      self.shell.as_deref(),
    )
    .await?;

    finish(out).await
  }
}

fn expected_output(request: &StepRequest) -> Result<PathBuf, StepError> {
  request
    .output_path
    .clone()
    .ok_or(StepError::Unsupported(request.rule.type_name()))
}

async fn copy_input(request: &StepRequest, input: &SourcePath) -> Result<BuildOutput, StepError> {
  let out = expected_output(request)?;
  let from = request.resolved_path(input)?.to_path_buf();
  prepare_output_dir(&request.output_dir).await?;

  debug!(target = %request.target, from = ?from, to = ?out, "copying prebuilt input");
  let to = out.clone();
  blocking(move || copy_path(&from, &to).map_err(StepError::io(&from))).await?;
  finish(out).await
}

async fn unzip_aar(request: &StepRequest, aar: &SourcePath) -> Result<BuildOutput, StepError> {
  let out = expected_output(request)?;
  let archive = request.resolved_path(aar)?;
  prepare_output_dir(&request.output_dir).await?;

  info!(target = %request.target, archive = ?archive, "unpacking aar");
  let output = Command::new("unzip")
    .arg("-o")
    .arg("-q")
    .arg(archive)
    .arg("-d")
    .arg(&request.output_dir)
    .output()
    .await
    .map_err(StepError::io(archive))?;

  if !output.status.success() {
    return Err(StepError::CommandFailed {
      cmd: format!("unzip {}", archive.display()),
      code: output.status.code(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    });
  }
  finish(out).await
}

/// Start from an empty output directory.
///
/// The directory is deleted first, so a path that climbs out with `..` or
/// names `.` is rejected.
async fn prepare_output_dir(dir: &Path) -> Result<(), StepError> {
  if dir
    .components()
    .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
  {
    return Err(StepError::UnsafeOutputDir(dir.to_path_buf()));
  }
  let dir = dir.to_path_buf();
  blocking(move || {
    remove_path(&dir).map_err(StepError::io(&dir))?;
    std::fs::create_dir_all(&dir).map_err(StepError::io(&dir))
  })
  .await
}

/// Check the step produced `out` and record its content hash.
async fn finish(out: PathBuf) -> Result<BuildOutput, StepError> {
  blocking(move || {
    if !out.exists() {
      return Err(StepError::MissingOutput(out));
    }
    let hash = hash_path(&out).map_err(|e| StepError::Io {
      path: out.clone(),
      message: e.to_string(),
    })?;
    Ok(BuildOutput::new(out).with_content_hash(hash))
  })
  .await
}

async fn blocking<T, F>(f: F) -> Result<T, StepError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, StepError> + Send + 'static,
{
  tokio::task::spawn_blocking(f).await.map_err(|e| StepError::Io {
    path: PathBuf::new(),
    message: e.to_string(),
  })?
}

/// Run `cmd` through the shell with a cleared environment plus `env`.
///
/// `PATH` is inherited from the host so commands can find their tools. `HOME`
/// points nowhere and the temp variables point into `out_dir`.
pub async fn execute_cmd(
  cmd: &str,
  env: &BTreeMap<String, String>,
  cwd: &Path,
  out_dir: &Path,
  shell: Option<&str>,
) -> Result<String, StepError> {
  info!(cmd = %cmd, "executing command");

  let tmp_dir = out_dir.join(TMP_DIR_NAME);
  tokio::fs::create_dir_all(&tmp_dir)
    .await
    .map_err(StepError::io(&tmp_dir))?;

  let (shell_cmd, shell_args) = get_shell(shell);

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(cmd)
    .current_dir(cwd)
    .env_clear()
    .env("HOME", "/homeless-shelter")
    .env("TMPDIR", &tmp_dir)
    .env("TMP", &tmp_dir)
    .env("TEMP", &tmp_dir)
    .env("TEMPDIR", &tmp_dir)
    .env("LANG", "C")
    .env("LC_ALL", "C")
    // 1980-01-01, the zip epoch
    .env("SOURCE_DATE_EPOCH", "315532800");
  if let Some(path) = std::env::var_os("PATH") {
    command.env("PATH", path);
  }
  command.envs(env);

  debug!(shell = %shell_cmd, working_dir = ?cwd, "spawning process");

  let output = command.output().await.map_err(StepError::io(cwd))?;
  let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

  if !output.status.success() {
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.is_empty() {
      debug!(stdout = %stdout, "command stdout");
    }
    return Err(StepError::CommandFailed {
      cmd: cmd.to_string(),
      code: output.status.code(),
      stderr,
    });
  }

  if !stderr.is_empty() {
    debug!(stderr = %stderr, "command stderr");
  }
  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }
  Ok(stdout)
}

/// Shell and the flag that passes it a command string.
///
/// Defaults to `/bin/sh` rather than `$SHELL`, whose profile files could
/// change the environment.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use crate::execute::env::step_env;
  use crate::rulekey::RuleKey;
  use crate::rules::{DepSets, Genrule, Rule};
  use crate::util::testutil::{genrule_with_cmd, prebuilt_jar, target};
  use std::sync::Arc;
  use tempfile::TempDir;

  fn request(rule: Rule, root: &Path, resolved: BTreeMap<SourcePath, PathBuf>) -> StepRequest {
    let output_dir = root.join("out").join(rule.target().short_name());
    let output_path = rule.output().and_then(|o| match o {
      SourcePath::Rule { path, .. } => Some(output_dir.join(path)),
      SourcePath::Path(_) => None,
    });
    let env = step_env(&rule, &resolved, &output_dir, output_path.as_deref(), &root.join("out"));
    StepRequest {
      target: rule.target().clone(),
      rule_key: RuleKey::from_hex(&"0".repeat(64)).unwrap(),
      rule: Arc::new(rule),
      output_dir,
      output_path,
      resolved,
      dependency_outputs: BTreeMap::new(),
      env,
      project_root: root.to_path_buf(),
    }
  }

  #[tokio::test]
  async fn execute_simple_command() {
    let temp = TempDir::new().unwrap();
    let result = execute_cmd("echo hello", &BTreeMap::new(), temp.path(), temp.path(), None)
      .await
      .unwrap();
    assert_eq!(result, "hello");
  }

  #[tokio::test]
  async fn environment_is_isolated() {
    let temp = TempDir::new().unwrap();
    let env = BTreeMap::from([("MY_VAR".to_string(), "my_value".to_string())]);

    let home = execute_cmd("echo $HOME", &env, temp.path(), temp.path(), None).await.unwrap();
    assert_eq!(home, "/homeless-shelter");
    let mine = execute_cmd("echo $MY_VAR", &env, temp.path(), temp.path(), None).await.unwrap();
    assert_eq!(mine, "my_value");
  }

  #[tokio::test]
  async fn failing_command_reports_exit_code() {
    let temp = TempDir::new().unwrap();
    let err = execute_cmd("echo oops >&2; exit 3", &BTreeMap::new(), temp.path(), temp.path(), None)
      .await
      .unwrap_err();
    assert_eq!(
      err,
      StepError::CommandFailed {
        cmd: "echo oops >&2; exit 3".to_string(),
        code: Some(3),
        stderr: "oops".to_string(),
      }
    );
  }

  #[tokio::test]
  async fn genrule_writes_out_from_sources() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("a.txt"), "alpha\n").unwrap();
    let id = target("//gen:cat");
    let kind = RuleKind::Genrule(Genrule {
      srcs: vec![SourcePath::path("a.txt")],
      cmd: "cat $SRCS > $OUT && test -f $SRCDIR/a.txt".to_string(),
      out: "cat.txt".to_string(),
      output_type: None,
      output: SourcePath::rule_output(id.clone(), "cat.txt"),
    });
    let rule = Rule::new(id, kind, DepSets::default());
    let resolved = BTreeMap::from([(SourcePath::path("a.txt"), temp.path().join("a.txt"))]);

    let output = ShellStepExecutor::default()
      .execute(request(rule, temp.path(), resolved))
      .await
      .unwrap();

    assert_eq!(output.path, temp.path().join("out/cat/cat.txt"));
    assert_eq!(std::fs::read_to_string(&output.path).unwrap(), "alpha\n");
    assert!(output.content_hash.is_some());
  }

  #[tokio::test]
  async fn genrule_without_output_fails() {
    let temp = TempDir::new().unwrap();
    let rule = genrule_with_cmd("//gen:lazy", "true");

    let err = ShellStepExecutor::default()
      .execute(request(rule, temp.path(), BTreeMap::new()))
      .await
      .unwrap_err();
    assert!(matches!(err, StepError::MissingOutput(_)));
  }

  #[tokio::test]
  async fn prebuilt_jar_is_copied() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("guava.jar"), "jar bytes").unwrap();
    let rule = prebuilt_jar("//java:guava", "guava.jar");
    let resolved = BTreeMap::from([(SourcePath::path("guava.jar"), temp.path().join("guava.jar"))]);

    let output = ShellStepExecutor::default()
      .execute(request(rule, temp.path(), resolved))
      .await
      .unwrap();
    assert_eq!(output.path, temp.path().join("out/guava/lib.jar"));
    assert_eq!(std::fs::read_to_string(&output.path).unwrap(), "jar bytes");
  }

  #[tokio::test]
  async fn output_dir_with_parent_components_is_left_alone() {
    let temp = TempDir::new().unwrap();
    let keep = temp.path().join("keep");
    std::fs::create_dir_all(&keep).unwrap();
    std::fs::write(keep.join("precious.txt"), "x").unwrap();

    let escaping = temp.path().join("out").join("__root__").join("..").join("..");
    let err = prepare_output_dir(&escaping).await.unwrap_err();
    assert!(matches!(err, StepError::UnsafeOutputDir(_)));
    assert!(keep.join("precious.txt").exists());
  }
}
