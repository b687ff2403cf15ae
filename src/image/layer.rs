//! Export of the produced root filesystem as a compressed layer tarball

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::{Builder, HeaderMode};
use tracing::{debug, info};

pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Location and content addresses of an exported layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub path: PathBuf,
    pub media_type: String,
    /// Digest of the compressed tarball
    pub digest: String,
    /// Digest of the uncompressed tar stream
    pub diff_id: String,
    /// Size of the compressed tarball in bytes
    pub size: u64,
}

/// Writer that hashes and counts everything passing through it
struct DigestWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    fn finish(self) -> (W, String, u64) {
        let digest = format!("sha256:{}", hex::encode(self.hasher.finalize()));
        (self.inner, digest, self.written)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Write `rootfs` as a gzip-compressed tar at `output`
///
/// Entries are added in sorted order with deterministic headers, so the same
/// tree always yields the same digests.
pub fn export_layer(rootfs: &Path, output: &Path) -> Result<LayerDescriptor> {
    info!(rootfs = %rootfs.display(), output = %output.display(), "Exporting layer");

    let file = File::create(output).context(format!("Failed to create layer file {:?}", output))?;
    let compressed = DigestWriter::new(file);
    let encoder = GzEncoder::new(compressed, Compression::default());
    let uncompressed = DigestWriter::new(encoder);

    let mut builder = Builder::new(uncompressed);
    builder.mode(HeaderMode::Deterministic);
    builder.follow_symlinks(false);

    let mut paths = Vec::new();
    collect_sorted(rootfs, rootfs, &mut paths)?;
    for relative in &paths {
        let full = rootfs.join(relative);
        debug!(path = %relative.display(), "Adding layer entry");
        builder
            .append_path_with_name(&full, relative)
            .context(format!("Failed to add {:?} to layer", full))?;
    }

    let uncompressed = builder.into_inner().context("Failed to finish tar stream")?;
    let (encoder, diff_id, _) = uncompressed.finish();
    let compressed = encoder.finish().context("Failed to finish gzip stream")?;
    let (mut file, digest, size) = compressed.finish();
    file.flush().context("Failed to flush layer file")?;

    info!(digest = %digest, size, entries = paths.len(), "Layer exported");

    Ok(LayerDescriptor {
        path: output.to_path_buf(),
        media_type: LAYER_MEDIA_TYPE.to_string(),
        digest,
        diff_id,
        size,
    })
}

fn collect_sorted(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .context(format!("Failed to read directory {:?}", dir))?
        .collect::<io::Result<Vec<_>>>()
        .context("Failed to read directory entry")?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .context("Failed to strip prefix")?
            .to_path_buf();
        let file_type = entry.file_type().context("Failed to read file type")?;
        out.push(relative);
        if file_type.is_dir() {
            collect_sorted(root, &path, out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn sample_rootfs() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/app")).unwrap();
        fs::write(dir.path().join("src/app/Gemfile"), "source 'https://rubygems.org'\n").unwrap();
        fs::write(dir.path().join("src/app/bean_machine.py"), "print('hi')\n").unwrap();
        dir
    }

    #[test]
    fn test_export_layer_contents() {
        let rootfs = sample_rootfs();
        let out = TempDir::new().unwrap();
        let layer_path = out.path().join("layer.tar.gz");

        let descriptor = export_layer(rootfs.path(), &layer_path).unwrap();
        assert_eq!(descriptor.media_type, LAYER_MEDIA_TYPE);
        assert!(descriptor.digest.starts_with("sha256:"));
        assert_ne!(descriptor.digest, descriptor.diff_id);
        assert_eq!(descriptor.size, fs::metadata(&layer_path).unwrap().len());

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&layer_path).unwrap()));
        let mut names = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry
                .path()
                .unwrap()
                .display()
                .to_string()
                .trim_end_matches('/')
                .to_string();
            if name.ends_with("bean_machine.py") {
                let mut content = String::new();
                entry.read_to_string(&mut content).unwrap();
                assert_eq!(content, "print('hi')\n");
            }
            names.push(name);
        }
        assert_eq!(
            names,
            vec![
                "src",
                "src/app",
                "src/app/Gemfile",
                "src/app/bean_machine.py"
            ]
        );
    }

    #[test]
    fn test_export_is_deterministic() {
        let rootfs = sample_rootfs();
        let out = TempDir::new().unwrap();

        let first = export_layer(rootfs.path(), &out.path().join("a.tar.gz")).unwrap();
        let second = export_layer(rootfs.path(), &out.path().join("b.tar.gz")).unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.diff_id, second.diff_id);
    }

    #[test]
    fn test_compressed_digest_matches_file() {
        let rootfs = sample_rootfs();
        let out = TempDir::new().unwrap();
        let layer_path = out.path().join("layer.tar.gz");

        let descriptor = export_layer(rootfs.path(), &layer_path).unwrap();
        let bytes = fs::read(&layer_path).unwrap();
        assert_eq!(descriptor.digest, crate::image::sha256_digest(&bytes));
    }
}
