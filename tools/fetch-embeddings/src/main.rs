//! Pretrained Embedding Download Tool
//!
//! Fetches the GloVe vectors the training hyperparameters point at and
//! unpacks the requested member next to the downloaded archive.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// GloVe 6B archive (Wikipedia 2014 + Gigaword 5)
const DEFAULT_URL: &str = "https://nlp.stanford.edu/data/glove.6B.zip";

/// Member extracted from zip archives by default
const DEFAULT_MEMBER: &str = "glove.6B.50d.txt";

/// Default embeddings directory
fn default_embeddings_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rnnoie")
        .join("embeddings")
}

/// CLI arguments
#[derive(Parser)]
#[command(name = "fetch-embeddings")]
#[command(about = "Download pretrained word embeddings for rnnoie")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Archive or text file to download
    #[arg(short, long, env = "RNNOIE_EMBEDDINGS_URL", default_value = DEFAULT_URL)]
    url: String,

    /// Embeddings directory
    #[arg(short = 'D', long, env = "RNNOIE_EMBEDDINGS_DIR")]
    dir: Option<PathBuf>,

    /// File to extract from a zip archive
    #[arg(short, long, default_value = DEFAULT_MEMBER)]
    member: String,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and unpack the embeddings (default)
    Download {
        /// Re-download even if the embeddings exist
        #[arg(short, long)]
        force: bool,
    },
    /// Show where the embeddings are and whether they exist
    Status,
    /// Remove downloaded files
    Clean {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// How a downloaded file is turned into a GloVe text file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Packing {
    Zip,
    Gzip,
    Plain,
}

/// Locations of one embedding download.
#[derive(Debug, Clone)]
pub struct EmbeddingFiles {
    dir: PathBuf,
    archive: String,
    member: String,
}

impl EmbeddingFiles {
    pub fn new(dir: PathBuf, url: &str, member: &str) -> Result<Self> {
        let archive = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .with_context(|| format!("cannot derive a file name from {url}"))?
            .to_string();

        Ok(Self {
            dir,
            archive,
            member: member.to_string(),
        })
    }

    fn packing(&self) -> Packing {
        if self.archive.ends_with(".zip") {
            Packing::Zip
        } else if self.archive.ends_with(".gz") {
            Packing::Gzip
        } else {
            Packing::Plain
        }
    }

    /// Path of the downloaded file
    pub fn archive_path(&self) -> PathBuf {
        self.dir.join(&self.archive)
    }

    /// Path of the GloVe text file to reference as `emb_filename`
    pub fn embeddings_path(&self) -> PathBuf {
        match self.packing() {
            Packing::Zip => self.dir.join(&self.member),
            Packing::Gzip => self.dir.join(self.archive.trim_end_matches(".gz")),
            Packing::Plain => self.archive_path(),
        }
    }

    /// Every file this download may leave behind, partial files included.
    pub fn owned_paths(&self) -> Vec<PathBuf> {
        let archive = self.archive_path();
        let target = self.embeddings_path();
        let mut paths = vec![
            archive.with_extension("part"),
            target.with_extension("part"),
            archive,
            target,
        ];
        paths.sort();
        paths.dedup();
        paths
    }

    /// Remove the downloaded and unpacked files. Other files in the
    /// directory are left alone. Returns the removed paths.
    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in self.owned_paths() {
            if path.is_file() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Unpack the downloaded file into `embeddings_path`.
    pub fn unpack(&self) -> Result<()> {
        let target = self.embeddings_path();
        let archive = File::open(self.archive_path())
            .with_context(|| format!("failed to open {}", self.archive_path().display()))?;

        match self.packing() {
            Packing::Plain => return Ok(()),
            Packing::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(BufReader::new(archive));
                copy_to(&mut decoder, &target)?;
            }
            Packing::Zip => {
                let mut zip = zip::ZipArchive::new(BufReader::new(archive))
                    .context("failed to read zip archive")?;
                let mut entry = zip
                    .by_name(&self.member)
                    .with_context(|| format!("{} is not in {}", self.member, self.archive))?;
                copy_to(&mut entry, &target)?;
            }
        }
        info!("Unpacked {}", target.display());
        Ok(())
    }
}

fn copy_to<R: std::io::Read>(reader: &mut R, target: &Path) -> Result<()> {
    let partial = target.with_extension("part");
    let mut out = BufWriter::new(
        File::create(&partial).with_context(|| format!("failed to create {}", partial.display()))?,
    );
    std::io::copy(reader, &mut out).context("failed to unpack embeddings")?;
    out.into_inner()
        .map_err(|e| e.into_error())
        .context("failed to flush embeddings")?;
    std::fs::rename(&partial, target)?;
    Ok(())
}

/// Stream `url` to `path`, writing through a `.part` file.
async fn download(url: &str, path: &Path) -> Result<()> {
    info!("Downloading {}", url);
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()?;

    let partial = path.with_extension("part");
    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("failed to create {}", partial.display()))?;

    let total = response.content_length();
    let mut written = 0u64;
    let mut next_report = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if written >= next_report {
            match total {
                Some(total) => info!("{} / {} MiB", written >> 20, total >> 20),
                None => info!("{} MiB", written >> 20),
            }
            next_report = written + (64 << 20);
        }
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&partial, path).await?;
    info!("Saved {} ({} bytes)", path.display(), written);
    Ok(())
}

fn size_of(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

/// The unpacked embeddings when they exist and no re-download was asked for.
fn existing_embeddings(files: &EmbeddingFiles, force: bool) -> Option<PathBuf> {
    let target = files.embeddings_path();
    (!force && target.is_file()).then_some(target)
}

fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;

    print!("{prompt} [y/N]: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

async fn run(cli: Cli) -> Result<()> {
    let dir = cli.dir.unwrap_or_else(default_embeddings_dir);
    let files = EmbeddingFiles::new(dir.clone(), &cli.url, &cli.member)?;

    match cli.command.unwrap_or(Commands::Download { force: false }) {
        Commands::Download { force } => {
            if let Some(existing) = existing_embeddings(&files, force) {
                info!("Embeddings already present at {}", existing.display());
                println!("{}", existing.display());
                return Ok(());
            }
            let target = files.embeddings_path();

            std::fs::create_dir_all(&dir)?;
            let archive = files.archive_path();
            if force || !archive.exists() {
                download(&cli.url, &archive).await?;
            } else {
                info!("Reusing {}", archive.display());
            }

            let unpacker = files.clone();
            tokio::task::spawn_blocking(move || unpacker.unpack())
                .await
                .context("unpack task panicked")??;

            if !target.exists() {
                bail!("{} was not produced", target.display());
            }
            println!("{}", target.display());
        }
        Commands::Status => {
            println!("Directory:  {}", dir.display());
            for (label, path) in [
                ("Archive:   ", files.archive_path()),
                ("Embeddings:", files.embeddings_path()),
            ] {
                match size_of(&path) {
                    Some(bytes) => println!("{} {} ({} MiB)", label, path.display(), bytes >> 20),
                    None => println!("{} {} (missing)", label, path.display()),
                }
            }
        }
        Commands::Clean { yes } => {
            let present: Vec<PathBuf> =
                files.owned_paths().into_iter().filter(|p| p.is_file()).collect();
            if present.is_empty() {
                warn!("Nothing to clean in {}", dir.display());
                return Ok(());
            }
            if !yes {
                println!("This will remove:");
                for path in &present {
                    println!("  {}", path.display());
                }
                if !confirm("Are you sure?")? {
                    info!("Clean cancelled");
                    return Ok(());
                }
            }
            for path in files.clean()? {
                info!("Removed {}", path.display());
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("fetch-embeddings failed: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_embeddings_dir() {
        let dir = default_embeddings_dir();
        assert!(dir.to_string_lossy().contains("rnnoie"));
    }

    #[test]
    fn test_paths_follow_packing() {
        let dir = PathBuf::from("/data");

        let zip = EmbeddingFiles::new(dir.clone(), DEFAULT_URL, DEFAULT_MEMBER).unwrap();
        assert_eq!(zip.archive_path(), dir.join("glove.6B.zip"));
        assert_eq!(zip.embeddings_path(), dir.join("glove.6B.50d.txt"));

        let gz = EmbeddingFiles::new(dir.clone(), "https://host/vec/glove.txt.gz?x=1", "").unwrap();
        assert_eq!(gz.archive_path(), dir.join("glove.txt.gz"));
        assert_eq!(gz.embeddings_path(), dir.join("glove.txt"));

        let plain = EmbeddingFiles::new(dir.clone(), "https://host/glove.txt", "").unwrap();
        assert_eq!(plain.embeddings_path(), plain.archive_path());

        assert!(EmbeddingFiles::new(dir, "https://host/", "").is_err());
    }

    #[test]
    fn test_clean_removes_only_download_files() {
        let dir = tempfile::tempdir().unwrap();
        let files =
            EmbeddingFiles::new(dir.path().to_path_buf(), DEFAULT_URL, DEFAULT_MEMBER).unwrap();
        for path in [
            files.archive_path(),
            files.embeddings_path(),
            files.archive_path().with_extension("part"),
        ] {
            std::fs::write(path, "x").unwrap();
        }
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&unrelated, "keep").unwrap();

        let removed = files.clean().unwrap();
        assert_eq!(removed.len(), 3);
        assert!(!files.archive_path().exists());
        assert!(!files.embeddings_path().exists());
        assert!(unrelated.exists());
        assert!(dir.path().exists());

        assert!(files.clean().unwrap().is_empty());
    }

    #[test]
    fn test_existing_embeddings_reported_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let files =
            EmbeddingFiles::new(dir.path().to_path_buf(), DEFAULT_URL, DEFAULT_MEMBER).unwrap();
        assert_eq!(existing_embeddings(&files, false), None);

        std::fs::write(files.embeddings_path(), "the 0.1\n").unwrap();
        assert_eq!(existing_embeddings(&files, false), Some(files.embeddings_path()));
        assert_eq!(existing_embeddings(&files, true), None);
    }

    #[test]
    fn test_plain_download_owns_one_file() {
        let files = EmbeddingFiles::new(PathBuf::from("/data"), "https://host/glove.txt", "").unwrap();
        assert_eq!(
            files.owned_paths(),
            vec![PathBuf::from("/data/glove.part"), PathBuf::from("/data/glove.txt")]
        );
    }

    #[test]
    fn test_unpack_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let files =
            EmbeddingFiles::new(dir.path().to_path_buf(), "https://host/vectors.txt.gz", "")
                .unwrap();

        let mut encoder = flate2::write::GzEncoder::new(
            File::create(files.archive_path()).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(b"the 0.1 0.2\ncat 0.3 0.4\n").unwrap();
        encoder.finish().unwrap();

        files.unpack().unwrap();
        assert_eq!(
            std::fs::read_to_string(files.embeddings_path()).unwrap(),
            "the 0.1 0.2\ncat 0.3 0.4\n"
        );
    }
}
