use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::OcrConfig;
use crate::paths;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Common tessdata locations on Linux, macOS (Homebrew) and Windows.
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tesseract-ocr/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tesseract-ocr/5/tessdata",
    "/usr/local/share/tesseract-ocr/4.00/tessdata",
    "/usr/local/share/tesseract-ocr/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
    "/opt/homebrew/share/tesseract-ocr/5/tessdata",
    "/opt/homebrew/share/tesseract-ocr/tessdata",
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
];

const SYSTEM_EXECUTABLES: &[&str] = &[
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];

pub struct TesseractPaths {
    pub executable: PathBuf,
    pub tessdata: PathBuf,
}

/// Resolves the Tesseract executable and a tessdata directory holding the
/// configured language. Downloads the language data if it is missing and
/// downloads are enabled.
pub fn ensure_tesseract(config: &OcrConfig) -> Result<TesseractPaths> {
    let executable = match &config.tesseract_path {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!(
                    "Configured Tesseract executable not found: {}",
                    path.display()
                ));
            }
            path.clone()
        }
        None => find_tesseract_executable()?,
    };

    let tessdata = match find_tessdata_dir(config.tessdata_dir.as_deref(), &config.language) {
        Some(dir) => dir,
        None if config.download_tessdata => {
            let dir = paths::get_tessdata_dir();
            download_tessdata(&dir, &config.language)?;
            dir
        }
        None => {
            return Err(anyhow!(
                "{}.traineddata not found. Set TESSDATA_PREFIX or TESSDATA_DIR, \
                 or enable download_tessdata",
                config.language
            ));
        }
    };

    tracing::info!("Tesseract found at: {}", executable.display());
    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Finds the Tesseract executable on PATH or in a common install location.
pub fn find_tesseract_executable() -> Result<PathBuf> {
    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    SYSTEM_EXECUTABLES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a directory containing `<language>.traineddata`.
///
/// Checks, in order: the configured directory, `TESSDATA_PREFIX` (both the
/// prefix itself and `<prefix>/tessdata`), the app data directory, and
/// common system locations.
pub fn find_tessdata_dir(configured: Option<&Path>, language: &str) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(dir) = configured {
        candidates.push(dir.to_path_buf());
    }
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let prefix = PathBuf::from(prefix);
        candidates.push(prefix.join("tessdata"));
        candidates.push(prefix);
    }
    candidates.push(paths::get_tessdata_dir());
    candidates.extend(SYSTEM_TESSDATA_DIRS.iter().map(PathBuf::from));

    first_with_language(&candidates, language)
}

fn first_with_language(candidates: &[PathBuf], language: &str) -> Option<PathBuf> {
    let file_name = format!("{}.traineddata", language);
    candidates
        .iter()
        .find(|dir| dir.join(&file_name).is_file())
        .cloned()
}

/// Downloads `<language>.traineddata` into `tessdata_dir`.
fn download_tessdata(tessdata_dir: &Path, language: &str) -> Result<()> {
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, language);
    let target = tessdata_dir.join(format!("{}.traineddata", language));

    tracing::info!("Downloading {} to {}", url, target.display());
    fs::create_dir_all(tessdata_dir).with_context(|| {
        format!("Failed to create tessdata directory: {}", tessdata_dir.display())
    })?;

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "clonehero-scores")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            language,
            response.status()
        ));
    }

    let bytes = response.bytes()?;

    // Write under a temporary name so an interrupted download is never picked up
    let partial = target.with_extension("traineddata.part");
    let mut file = fs::File::create(&partial)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    fs::rename(&partial, &target)?;

    tracing::info!("Downloaded {}.traineddata ({} bytes)", language, bytes.len());

    Ok(())
}
