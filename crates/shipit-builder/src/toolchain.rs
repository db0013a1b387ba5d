//! External toolchain invocation.
//!
//! The builder drives the vendored firmware toolchain as a child process
//! and observes only its exit status and the files it leaves behind. The
//! toolchain may parallelize internally; that is opaque here.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use shipit_core::artifact::{ArtifactKind, ArtifactSet, BuildSpec};
use shipit_core::error::BuildError;

/// Intermediate the manifest-freezing step leaves in the output tree.
///
/// The toolchain reuses it across runs even when the manifest or board
/// changed, so it must be removed before every build.
pub const FROZEN_INTERMEDIATE: &str = "frozen_content.c";

/// How to invoke the external firmware toolchain.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Program to run, e.g. `make`.
    pub program: String,
    /// Leading arguments, before the board and manifest assignments.
    pub args: Vec<String>,
    /// Directory to run the toolchain in.
    pub working_dir: Option<PathBuf>,
    /// Directory holding one sub-directory per known board.
    pub boards_dir: PathBuf,
}

/// Relative location of each artifact inside the toolchain's output tree.
fn toolchain_output(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Bootloader => "bootloader/bootloader.bin",
        ArtifactKind::PartitionTable => "partition_table/partition-table.bin",
        ArtifactKind::OtaInitData => "ota_data_initial.bin",
        ArtifactKind::ApplicationImage => "micropython.bin",
    }
}

/// Builds one board's firmware image set.
pub struct FirmwareBuilder {
    toolchain: ToolchainConfig,
}

impl FirmwareBuilder {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { toolchain }
    }

    /// Remove anything a previous run could leak into this build: the
    /// frozen-manifest intermediate and all previously produced artifacts.
    /// Returns the paths that were actually removed.
    pub fn clean_stale_outputs(spec: &BuildSpec) -> Result<Vec<PathBuf>, BuildError> {
        let mut candidates = vec![spec.output_dir.join(FROZEN_INTERMEDIATE)];
        candidates.extend(
            ArtifactKind::ALL
                .iter()
                .map(|kind| spec.output_dir.join(toolchain_output(*kind))),
        );

        let mut removed = Vec::new();
        for path in candidates {
            match std::fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(BuildError::Io(e)),
            }
        }
        Ok(removed)
    }

    /// Run the toolchain for `spec` and collect the resulting artifact set.
    ///
    /// Every artifact must come out readable and non-empty; a missing file
    /// after a zero exit status is still a build failure.
    pub async fn build(&self, spec: &BuildSpec) -> Result<ArtifactSet, BuildError> {
        if !spec.manifest.is_file() {
            return Err(BuildError::MissingManifest(spec.manifest.clone()));
        }
        if !self.toolchain.boards_dir.join(&spec.board).is_dir() {
            return Err(BuildError::UnknownBoard(spec.board.clone()));
        }

        let removed = Self::clean_stale_outputs(spec)?;
        if !removed.is_empty() {
            debug!(count = removed.len(), "Removed stale build outputs");
        }

        let mut command = Command::new(&self.toolchain.program);
        command
            .args(&self.toolchain.args)
            .arg(format!("BOARD={}", spec.board))
            .arg(format!("FROZEN_MANIFEST={}", spec.manifest.display()))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.toolchain.working_dir {
            command.current_dir(dir);
        }

        info!(program = %self.toolchain.program, board = %spec.board, "Starting toolchain");
        let mut child = command.spawn().map_err(|e| BuildError::Spawn {
            program: self.toolchain.program.clone(),
            source: e,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(forward_lines(stdout, false));
        let stderr_task = tokio::spawn(forward_lines(stderr, true));

        let status = child.wait().await?;
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        if !status.success() {
            return Err(BuildError::Toolchain { status });
        }

        let mut set = ArtifactSet::new();
        for kind in ArtifactKind::ALL {
            let path = spec.output_dir.join(toolchain_output(kind));
            let metadata =
                std::fs::metadata(&path).map_err(|_| BuildError::MissingArtifact(kind))?;
            if metadata.len() == 0 {
                return Err(BuildError::EmptyArtifact(kind));
            }
            set.insert(kind, path);
        }

        info!(board = %spec.board, "Build produced a complete artifact set");
        Ok(set)
    }
}

async fn forward_lines<R>(reader: Option<R>, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(reader) = reader else { return };
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            warn!(target: "toolchain", "{}", line);
        } else {
            debug!(target: "toolchain", "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        spec: BuildSpec,
        boards_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let boards_dir = root.join("boards");
        std::fs::create_dir_all(boards_dir.join("esp32-frog")).unwrap();

        let manifest = root.join("manifest.py");
        std::fs::write(&manifest, "freeze(\"modules\")\n").unwrap();

        let output_dir = root.join("build");
        std::fs::create_dir_all(&output_dir).unwrap();

        Fixture {
            spec: BuildSpec {
                board: "esp32-frog".to_string(),
                manifest,
                output_dir,
            },
            boards_dir,
            _tmp: tmp,
        }
    }

    fn builder(fixture: &Fixture, program: &str, args: Vec<String>) -> FirmwareBuilder {
        FirmwareBuilder::new(ToolchainConfig {
            program: program.to_string(),
            args,
            working_dir: None,
            boards_dir: fixture.boards_dir.clone(),
        })
    }

    /// Shell script standing in for the real toolchain: writes all four
    /// expected outputs into the build tree.
    fn fake_toolchain_script(output_dir: &Path) -> String {
        let out = output_dir.display();
        format!(
            "mkdir -p {out}/bootloader {out}/partition_table && \
             printf boot > {out}/bootloader/bootloader.bin && \
             printf part > {out}/partition_table/partition-table.bin && \
             printf ota > {out}/ota_data_initial.bin && \
             printf app > {out}/micropython.bin"
        )
    }

    #[tokio::test]
    async fn build_produces_a_complete_artifact_set() {
        let fixture = fixture();
        let script = fake_toolchain_script(&fixture.spec.output_dir);
        let builder = builder(&fixture, "sh", vec!["-c".to_string(), script]);

        let set = builder.build(&fixture.spec).await.unwrap();

        assert!(set.is_complete());
        for (_, path) in set.iter() {
            assert!(path.is_file());
        }
    }

    #[tokio::test]
    async fn build_rejects_unknown_board() {
        let mut fixture = fixture();
        fixture.spec.board = "esp32-toad".to_string();
        let builder = builder(&fixture, "true", vec![]);

        let err = builder.build(&fixture.spec).await.unwrap_err();
        assert!(matches!(err, BuildError::UnknownBoard(board) if board == "esp32-toad"));
    }

    #[tokio::test]
    async fn build_rejects_missing_manifest() {
        let mut fixture = fixture();
        fixture.spec.manifest = fixture.spec.manifest.with_file_name("absent.py");
        let builder = builder(&fixture, "true", vec![]);

        let err = builder.build(&fixture.spec).await.unwrap_err();
        assert!(matches!(err, BuildError::MissingManifest(_)));
    }

    #[tokio::test]
    async fn build_reports_toolchain_exit_status() {
        let fixture = fixture();
        let builder = builder(&fixture, "sh", vec!["-c".to_string(), "exit 3".to_string()]);

        let err = builder.build(&fixture.spec).await.unwrap_err();
        match err {
            BuildError::Toolchain { status } => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_artifact_after_zero_exit_is_a_build_failure() {
        let fixture = fixture();
        // Toolchain "succeeds" without producing anything.
        let builder = builder(&fixture, "true", vec![]);

        let err = builder.build(&fixture.spec).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::MissingArtifact(ArtifactKind::Bootloader)
        ));
    }

    #[tokio::test]
    async fn empty_artifact_is_a_build_failure() {
        let fixture = fixture();
        let out = fixture.spec.output_dir.display().to_string();
        let script = format!(
            "{} && : > {}/bootloader/bootloader.bin",
            fake_toolchain_script(&fixture.spec.output_dir),
            out
        );
        let builder = builder(&fixture, "sh", vec!["-c".to_string(), script]);

        let err = builder.build(&fixture.spec).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::EmptyArtifact(ArtifactKind::Bootloader)
        ));
    }

    #[test]
    fn clean_removes_frozen_intermediate_and_prior_artifacts() {
        let fixture = fixture();
        let out = &fixture.spec.output_dir;
        std::fs::create_dir_all(out.join("bootloader")).unwrap();
        std::fs::write(out.join(FROZEN_INTERMEDIATE), "stale").unwrap();
        std::fs::write(out.join("bootloader/bootloader.bin"), "stale").unwrap();

        let removed = FirmwareBuilder::clean_stale_outputs(&fixture.spec).unwrap();

        assert_eq!(removed.len(), 2);
        assert!(!out.join(FROZEN_INTERMEDIATE).exists());
        assert!(!out.join("bootloader/bootloader.bin").exists());
    }

    #[test]
    fn clean_is_a_no_op_on_a_fresh_output_dir() {
        let fixture = fixture();

        let removed = FirmwareBuilder::clean_stale_outputs(&fixture.spec).unwrap();
        assert!(removed.is_empty());
    }
}
