use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;
use tempfile::{Builder, NamedTempFile, TempDir};

use crate::error::PipelineError;

pub const DOWNLOAD_DIR: &str = "download";
pub const STAGE_DIR: &str = "stage";

/// Archive layout: raw source files under `download/`, staged documents under `stage/`.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: Utf8PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn download_dir(&self) -> Utf8PathBuf {
        self.root.join(DOWNLOAD_DIR)
    }

    pub fn stage_dir(&self) -> Utf8PathBuf {
        self.root.join(STAGE_DIR)
    }

    /// Relative input paths live under the download directory.
    pub fn input_path(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.download_dir().join(path)
        }
    }

    pub fn stage_path(&self, name: &str, extension: &str) -> Utf8PathBuf {
        self.stage_dir().join(format!("{name}.{extension}"))
    }

    pub fn ensure_stage_dir(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(self.stage_dir().as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))
    }

    /// Opens a text table, decompressing `.gz` files on the fly.
    pub fn open_text(&self, path: &Utf8Path) -> Result<Box<dyn BufRead>, PipelineError> {
        let path = self.input_path(path);
        let file = open_input(&path)?;
        if path.extension() == Some("gz") {
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
        } else {
            Ok(Box::new(BufReader::new(file)))
        }
    }

    /// Scratch directory inside the stage directory, removed on drop.
    pub fn scratch_dir(&self) -> Result<TempDir, PipelineError> {
        self.ensure_stage_dir()?;
        Builder::new()
            .prefix("genedocs-scratch")
            .tempdir_in(self.stage_dir().as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))
    }

    pub fn create_stage_file(&self, name: &str, extension: &str) -> Result<StageFile, PipelineError> {
        self.ensure_stage_dir()?;
        let target = self.stage_path(name, extension);
        let temp = Builder::new()
            .prefix("genedocs-stage")
            .tempfile_in(self.stage_dir().as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(StageFile {
            writer: BufWriter::new(temp),
            target,
        })
    }
}

/// Output file that only replaces its target on [`StageFile::commit`].
/// Dropping it uncommitted deletes the partial file.
pub struct StageFile {
    writer: BufWriter<NamedTempFile>,
    target: Utf8PathBuf,
}

impl StageFile {
    pub fn target(&self) -> &Utf8Path {
        &self.target
    }

    pub fn commit(self) -> Result<Utf8PathBuf, PipelineError> {
        let temp = self
            .writer
            .into_inner()
            .map_err(|err| PipelineError::Filesystem(err.error().to_string()))?;
        temp.persist(self.target.as_std_path())
            .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
        Ok(self.target)
    }
}

impl Write for StageFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

fn open_input(path: &Utf8Path) -> Result<File, PipelineError> {
    if !path.as_std_path().exists() {
        return Err(PipelineError::InputNotFound(path.to_string()));
    }
    File::open(path.as_std_path()).map_err(|err| PipelineError::Filesystem(format!("open {path}: {err}")))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn workspace() -> (TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, Workspace::new(root))
    }

    #[test]
    fn layout_paths() {
        let workspace = Workspace::new("/data");
        assert_eq!(
            workspace.input_path(Utf8Path::new("bioplex/BioPlex.tsv")),
            Utf8PathBuf::from("/data/download/bioplex/BioPlex.tsv")
        );
        assert_eq!(
            workspace.input_path(Utf8Path::new("/elsewhere/x.tsv")),
            Utf8PathBuf::from("/elsewhere/x.tsv")
        );
        assert!(workspace.stage_path("intact", "json").ends_with("stage/intact.json"));
    }

    #[test]
    fn reads_gzip_tables() {
        let (_dir, workspace) = workspace();
        fs::create_dir_all(workspace.download_dir().as_std_path()).unwrap();
        let path = workspace.download_dir().join("gene_history.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"9606\t-\t1\tA\t20050101\n").unwrap();
        fs::write(path.as_std_path(), encoder.finish().unwrap()).unwrap();

        let mut text = String::new();
        workspace
            .open_text(Utf8Path::new("gene_history.gz"))
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "9606\t-\t1\tA\t20050101\n");
    }

    #[test]
    fn missing_input_is_reported() {
        let (_dir, workspace) = workspace();
        assert!(matches!(
            workspace.open_text(Utf8Path::new("absent.txt")),
            Err(PipelineError::InputNotFound(_))
        ));
    }

    #[test]
    fn stage_file_appears_only_on_commit() {
        let (_dir, workspace) = workspace();
        let mut file = workspace.create_stage_file("pathways", "json").unwrap();
        file.write_all(b"{}").unwrap();
        let target = file.target().to_path_buf();
        assert!(!target.as_std_path().exists());
        file.commit().unwrap();
        assert_eq!(fs::read_to_string(target.as_std_path()).unwrap(), "{}");

        let mut dropped = workspace.create_stage_file("dropped", "json").unwrap();
        dropped.write_all(b"partial").unwrap();
        drop(dropped);
        assert!(!workspace.stage_path("dropped", "json").as_std_path().exists());
    }
}
