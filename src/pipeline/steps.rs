//! Application of individual build steps
//!
//! Every step takes the image state produced by the previous one and returns
//! the next. Filesystem effects land in the image layer as they happen.

use crate::context::BuildContext;
use crate::error::BuildError;
use crate::fs::{FileSystem, FileType};
use crate::image::path;
use crate::image::{HistoryEntry, ImageState};
use crate::plan::{BuildStep, RunOptions};
use crate::runner::{CommandRunner, RunRequest};
use anyhow::Context;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Collaborators a step may touch
pub struct StepEnv<'a> {
    pub fs: &'a dyn FileSystem,
    pub context: &'a BuildContext,
    pub runner: &'a dyn CommandRunner,
    pub timeout: Option<Duration>,
}

pub async fn apply_step(
    state: ImageState,
    index: usize,
    step: &BuildStep,
    env: &StepEnv<'_>,
) -> Result<ImageState, BuildError> {
    let mut next = match step {
        BuildStep::Workdir(dir) => set_workdir(state, env.fs, dir)?,
        BuildStep::Copy {
            source,
            destination,
        } => copy_files(state, env.fs, env.context, source, destination)?,
        BuildStep::Env { key, value } => set_env(state, key, value),
        BuildStep::Run { argv, options } => run_command(state, index, argv, options, env).await?,
        BuildStep::Entrypoint(argv) => set_entrypoint(state, argv),
    };

    next.history.push(HistoryEntry {
        step: index,
        kind: step.kind(),
        created_by: step.instruction(),
    });
    Ok(next)
}

pub fn set_workdir(
    mut state: ImageState,
    fs: &dyn FileSystem,
    dir: &str,
) -> Result<ImageState, BuildError> {
    let workdir = path::absolute(dir)?;
    ensure_dir(fs, &workdir)?;
    debug!(workdir = %workdir.display(), "Working directory set");
    state.workdir = workdir;
    Ok(state)
}

pub fn copy_files(
    state: ImageState,
    fs: &dyn FileSystem,
    context: &BuildContext,
    source: &str,
    destination: &str,
) -> Result<ImageState, BuildError> {
    if destination.is_empty() || destination.contains('\0') {
        return Err(BuildError::InvalidPath {
            path: destination.to_string(),
            reason: "destination must be a non-empty path".to_string(),
        });
    }

    let selection = context.select(source)?;
    let target = path::resolve(&state.workdir, destination);

    let exact_file = selection.single_file
        && !destination.ends_with('/')
        && fs.file_type(&target) != Some(FileType::Directory);

    if exact_file {
        let entry = &selection.entries[0];
        if let Some(parent) = target.parent() {
            ensure_dir(fs, parent)?;
        }
        copy_file(fs, &entry.host_path, &target)?;
    } else {
        ensure_dir(fs, &target)?;
        for entry in &selection.entries {
            let dest = target.join(&entry.target);
            if entry.is_dir {
                ensure_dir(fs, &dest)?;
            } else {
                if let Some(parent) = dest.parent() {
                    ensure_dir(fs, parent)?;
                }
                copy_file(fs, &entry.host_path, &dest)?;
            }
        }
    }

    info!(
        source,
        destination = %target.display(),
        entries = selection.entries.len(),
        "Copied files from build context"
    );
    Ok(state)
}

pub fn set_env(mut state: ImageState, key: &str, value: &str) -> ImageState {
    if let Some(previous) = state.env.insert(key.to_string(), value.to_string()) {
        debug!(key, previous = %previous, value, "Environment variable overwritten");
    }
    state
}

pub async fn run_command(
    state: ImageState,
    index: usize,
    argv: &[String],
    options: &RunOptions,
    env: &StepEnv<'_>,
) -> Result<ImageState, BuildError> {
    let request = RunRequest {
        argv: argv.to_vec(),
        env: state.env.clone(),
        cwd: env.fs.host_path(&state.workdir),
        options: options.clone(),
        timeout: env.timeout,
    };

    let exit_code = env
        .runner
        .run(&request)
        .await
        .with_context(|| format!("Runner '{}' failed to execute step {}", env.runner.name(), index))?;

    if exit_code != 0 {
        return Err(BuildError::StepFailed { index, exit_code });
    }
    Ok(state)
}

pub fn set_entrypoint(mut state: ImageState, argv: &[String]) -> ImageState {
    state.entrypoint = Some(argv.to_vec());
    state
}

/// Create `dir` and any missing ancestors, refusing to pass through files or symlinks
fn ensure_dir(fs: &dyn FileSystem, dir: &Path) -> Result<(), BuildError> {
    for ancestor in path::ancestors_inclusive(dir) {
        match fs.file_type(&ancestor) {
            Some(FileType::Directory) => {}
            Some(_) => return Err(BuildError::PathConflict { path: ancestor }),
            None => fs.create_dir(&ancestor)?,
        }
    }
    Ok(())
}

/// Write one context file; an existing symlink at `dest` is never followed
fn copy_file(fs: &dyn FileSystem, host_source: &Path, dest: &Path) -> Result<(), BuildError> {
    if let Some(FileType::Directory | FileType::Symlink) = fs.file_type(dest) {
        return Err(BuildError::PathConflict {
            path: dest.to_path_buf(),
        });
    }
    let contents = std::fs::read(host_source)
        .with_context(|| format!("Failed to read {:?} from build context", host_source))?;
    fs.write(dest, &contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use crate::runner::ScriptedRunner;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn context_with(files: &[(&str, &str)]) -> (TempDir, BuildContext) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        let context = BuildContext::load(dir.path()).unwrap();
        (dir, context)
    }

    fn read(fs: &MockFileSystem, path: &str) -> String {
        String::from_utf8(fs.read(Path::new(path)).unwrap()).unwrap()
    }

    #[test]
    fn test_set_workdir_creates_directories() {
        let fs = MockFileSystem::new();
        let state = set_workdir(ImageState::new(), &fs, "/src/bcknd/app").unwrap();

        assert_eq!(state.workdir, PathBuf::from("/src/bcknd/app"));
        assert!(fs.is_dir(Path::new("/src")));
        assert!(fs.is_dir(Path::new("/src/bcknd/app")));
    }

    #[test]
    fn test_set_workdir_twice_is_idempotent() {
        let fs = MockFileSystem::new();
        let once = set_workdir(ImageState::new(), &fs, "/a").unwrap();
        let paths_once = fs.file_paths();
        let twice = set_workdir(once.clone(), &fs, "/a").unwrap();

        assert_eq!(once, twice);
        assert_eq!(paths_once, fs.file_paths());
    }

    #[test]
    fn test_set_workdir_conflicts_with_file() {
        let fs = MockFileSystem::new();
        fs.add_file("/src", "not a directory");

        let err = set_workdir(ImageState::new(), &fs, "/src/app").unwrap_err();
        assert!(matches!(err, BuildError::PathConflict { path } if path == PathBuf::from("/src")));
    }

    #[test]
    fn test_set_workdir_rejects_relative() {
        let fs = MockFileSystem::new();
        let err = set_workdir(ImageState::new(), &fs, "src/app").unwrap_err();
        assert!(matches!(err, BuildError::InvalidPath { .. }));
    }

    #[test]
    fn test_copy_reproduces_bytes() {
        let fs = MockFileSystem::new();
        let (_dir, context) = context_with(&[("f1", "x"), ("f2", "y")]);
        let state = set_workdir(ImageState::new(), &fs, "/app").unwrap();

        copy_files(state, &fs, &context, ".", ".").unwrap();

        assert_eq!(read(&fs, "/app/f1"), "x");
        assert_eq!(read(&fs, "/app/f2"), "y");
        assert_eq!(
            fs.file_paths(),
            vec![PathBuf::from("/app/f1"), PathBuf::from("/app/f2")]
        );
    }

    #[test]
    fn test_copy_single_file_to_exact_destination() {
        let fs = MockFileSystem::new();
        let (_dir, context) = context_with(&[("config/app.yml", "port: 80")]);

        copy_files(ImageState::new(), &fs, &context, "config/app.yml", "/etc/app.yaml").unwrap();
        assert_eq!(read(&fs, "/etc/app.yaml"), "port: 80");
    }

    #[test]
    fn test_copy_single_file_into_directory() {
        let fs = MockFileSystem::new();
        let (_dir, context) = context_with(&[("config/app.yml", "port: 80")]);

        copy_files(ImageState::new(), &fs, &context, "config/app.yml", "/etc/").unwrap();
        assert_eq!(read(&fs, "/etc/app.yml"), "port: 80");
    }

    #[test]
    fn test_copy_conflicts_with_existing_file() {
        let fs = MockFileSystem::new();
        fs.add_file("/app/lib", "file in the way");
        let (_dir, context) = context_with(&[("lib/board.rb", "class Board; end")]);

        let err = copy_files(ImageState::new(), &fs, &context, ".", "/app").unwrap_err();
        assert!(matches!(err, BuildError::PathConflict { path } if path == PathBuf::from("/app/lib")));
    }

    #[test]
    fn test_copy_missing_source() {
        let fs = MockFileSystem::new();
        let (_dir, context) = context_with(&[("a.txt", "a")]);

        let err = copy_files(ImageState::new(), &fs, &context, "*.rb", "/app").unwrap_err();
        assert!(matches!(err, BuildError::SourceNotFound { .. }));
    }

    #[test]
    fn test_copy_glob_skips_nested_matches() {
        let fs = MockFileSystem::new();
        let (_dir, context) = context_with(&[
            ("main.rb", "puts 1"),
            ("lib/deep/x.rb", "puts 2"),
        ]);

        copy_files(ImageState::new(), &fs, &context, "*.rb", "/app").unwrap();
        assert_eq!(fs.file_paths(), vec![PathBuf::from("/app/main.rb")]);
        assert!(!fs.exists(Path::new("/app/lib")));
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_refuses_symlinked_ancestor() {
        use crate::fs::RealFileSystem;

        let rootfs = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), rootfs.path().join("app")).unwrap();
        let fs = RealFileSystem::rooted(rootfs.path());
        let (_dir, context) = context_with(&[("Gemfile", "gem 'rake'")]);

        let err = copy_files(ImageState::new(), &fs, &context, ".", "/app/src").unwrap_err();
        assert!(matches!(err, BuildError::PathConflict { path } if path == PathBuf::from("/app")));
        assert!(!outside.path().join("src").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_refuses_symlinked_destination_file() {
        use crate::fs::RealFileSystem;

        let rootfs = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("victim.txt");
        fs::write(&target, "untouched").unwrap();
        std::os::unix::fs::symlink(&target, rootfs.path().join("Gemfile")).unwrap();
        let real = RealFileSystem::rooted(rootfs.path());
        let (_dir, context) = context_with(&[("Gemfile", "gem 'rake'")]);

        let err = copy_files(ImageState::new(), &real, &context, "Gemfile", "/Gemfile").unwrap_err();
        assert!(matches!(err, BuildError::PathConflict { .. }));
        assert_eq!(fs::read_to_string(&target).unwrap(), "untouched");
    }

    #[test]
    fn test_set_env_last_write_wins() {
        let state = set_env(ImageState::new(), "A", "1");
        let state = set_env(state, "A", "2");
        assert_eq!(state.env["A"], "2");
        assert_eq!(state.env.len(), 1);
    }

    #[test]
    fn test_set_entrypoint_overwrites() {
        let state = set_entrypoint(ImageState::new(), &["first".to_string()]);
        let state = set_entrypoint(state, &["python".to_string(), "./bean_machine.py".to_string()]);
        assert_eq!(
            state.entrypoint,
            Some(vec!["python".to_string(), "./bean_machine.py".to_string()])
        );
    }

    #[tokio::test]
    async fn test_run_command_passes_state_to_runner() {
        let fs = MockFileSystem::new();
        let (_dir, context) = context_with(&[("Gemfile", "")]);
        let runner = ScriptedRunner::new();
        let env = StepEnv {
            fs: &fs,
            context: &context,
            runner: &runner,
            timeout: Some(Duration::from_secs(30)),
        };

        let state = set_workdir(ImageState::new(), &fs, "/src/app").unwrap();
        let state = set_env(state, "BUNDLE_FROZEN", "true");
        let argv = vec!["bundle".to_string(), "install".to_string()];
        let options = RunOptions::frozen().without(["test"]);

        run_command(state, 3, &argv, &options, &env).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].argv, argv);
        assert_eq!(calls[0].cwd, PathBuf::from("/mock/src/app"));
        assert_eq!(calls[0].env["BUNDLE_FROZEN"], "true");
        assert_eq!(calls[0].options, options);
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_run_command_failure_carries_index() {
        let fs = MockFileSystem::new();
        let (_dir, context) = context_with(&[("Gemfile", "")]);
        let runner = ScriptedRunner::always(7);
        let env = StepEnv {
            fs: &fs,
            context: &context,
            runner: &runner,
            timeout: None,
        };

        let err = run_command(ImageState::new(), 2, &["false".to_string()], &RunOptions::default(), &env)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::StepFailed { index: 2, exit_code: 7 }));
    }

    #[tokio::test]
    async fn test_apply_step_records_history() {
        let fs = MockFileSystem::new();
        let (_dir, context) = context_with(&[("Gemfile", "")]);
        let runner = ScriptedRunner::new();
        let env = StepEnv {
            fs: &fs,
            context: &context,
            runner: &runner,
            timeout: None,
        };

        let step = BuildStep::Env {
            key: "BUNDLE_FROZEN".into(),
            value: "true".into(),
        };
        let state = apply_step(ImageState::new(), 0, &step, &env).await.unwrap();

        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].step, 0);
        assert_eq!(state.history[0].created_by, step.instruction());
    }
}
