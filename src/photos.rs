use std::fmt;
use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::{Context, eyre};
use image::DynamicImage;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use walkdir::WalkDir;

/// Input formats the photo pipeline will pick up.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tiff", "tif"];

/// Aggregate counters for one pass over a photo directory.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PhotoSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl fmt::Display for PhotoSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} converted ({} KB -> {} KB), {} skipped, {} failed",
            self.converted,
            self.bytes_in / 1024,
            self.bytes_out / 1024,
            self.skipped,
            self.failed
        )
    }
}

/// Bounding box for thumbnail generation. Aspect ratio is preserved and
/// images already inside the bounds are never enlarged.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailBounds {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for ThumbnailBounds {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 1200,
        }
    }
}

/// Transcode every supported photo in `input` to lossless WebP in `output`,
/// skipping outputs that already exist.
pub fn compress_photos(input: &Path, output: &Path) -> Result<PhotoSummary> {
    process_directory(input, output, "", None)
}

/// Generate `<stem>-thumb.webp` thumbnails, bounded to `bounds`, for every
/// supported photo in `input`.
pub fn generate_thumbnails(
    input: &Path,
    output: &Path,
    bounds: ThumbnailBounds,
) -> Result<PhotoSummary> {
    process_directory(input, output, "-thumb", Some(bounds))
}

fn process_directory(
    input: &Path,
    output: &Path,
    stem_suffix: &str,
    bounds: Option<ThumbnailBounds>,
) -> Result<PhotoSummary> {
    let files = image_files(input)?;

    std::fs::create_dir_all(output)
        .wrap_err_with(|| format!("Failed to create output directory: {}", output.display()))?;

    log::info!(
        "Processing {} photos from {}",
        files.len(),
        input.display()
    );

    let mut summary = PhotoSummary::default();

    for path in files {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let filename = format!("{stem}{stem_suffix}.webp");
        let dest = output.join(&filename);

        if dest.exists() {
            log::info!("Already exists, skipping: {filename}");
            summary.skipped += 1;
            continue;
        }

        match convert_photo(&path, &dest, bounds) {
            Ok((bytes_in, bytes_out)) => {
                log::info!(
                    "Wrote {filename} ({} KB -> {} KB)",
                    bytes_in / 1024,
                    bytes_out / 1024
                );
                summary.converted += 1;
                summary.bytes_in += bytes_in;
                summary.bytes_out += bytes_out;
            }
            Err(err) => {
                log::warn!("Failed to convert {}: {err:#}", path.display());
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// List supported image files directly inside `dir`, sorted for a stable
/// processing order.
fn image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(eyre!("Not a directory: {}", dir.display()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();
    files.sort();

    Ok(files)
}

fn convert_photo(
    src: &Path,
    dest: &Path,
    bounds: Option<ThumbnailBounds>,
) -> Result<(u64, u64)> {
    let img = image::open(src).wrap_err_with(|| format!("Failed to decode {}", src.display()))?;

    let img = match bounds {
        Some(b) if img.width() > b.max_width || img.height() > b.max_height => {
            img.resize(b.max_width, b.max_height, FilterType::Lanczos3)
        }
        _ => img,
    };

    write_webp(&img, dest)?;

    let bytes_in = std::fs::metadata(src)
        .wrap_err_with(|| format!("Failed to stat {}", src.display()))?
        .len();
    let bytes_out = std::fs::metadata(dest)
        .wrap_err_with(|| format!("Failed to stat {}", dest.display()))?
        .len();

    Ok((bytes_in, bytes_out))
}

/// Encode to WebP via a temp file renamed into place, so a failed encode
/// never leaves a partial output to be skipped over on the next run.
fn write_webp(img: &DynamicImage, dest: &Path) -> Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| eyre!("Output path has no parent directory"))?;
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .wrap_err("Failed to create temporary image file")?;

    let encoder = WebPEncoder::new_lossless(tmp.as_file());
    img.to_rgba8()
        .write_with_encoder(encoder)
        .wrap_err_with(|| format!("Failed to encode {}", dest.display()))?;

    tmp.persist(dest)
        .wrap_err_with(|| format!("Failed to persist {}", dest.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([120, 30, 200, 255]),
        ));
        img.save(path).unwrap();
    }

    #[test]
    fn test_image_files_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_png(&dir.path().join("photo.png"), 4, 4);
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        std::fs::write(dir.path().join("no-extension"), "").unwrap();

        let files = image_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("photo.png"));
    }

    #[test]
    fn test_image_files_fails_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(image_files(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_compress_converts_and_then_skips() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        write_png(&input.join("shot.png"), 8, 8);

        let summary = compress_photos(&input, &output).unwrap();
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.skipped, 0);
        assert!(output.join("shot.webp").exists());

        // Second pass hits the skip-if-exists path.
        let summary = compress_photos(&input, &output).unwrap();
        assert_eq!(summary.converted, 0);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_thumbnails_fit_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        write_png(&input.join("wide.png"), 1600, 800);

        let bounds = ThumbnailBounds {
            max_width: 800,
            max_height: 1200,
        };
        let summary = generate_thumbnails(&input, &output, bounds).unwrap();
        assert_eq!(summary.converted, 1);

        let (w, h) = image::image_dimensions(output.join("wide-thumb.webp")).unwrap();
        assert_eq!((w, h), (800, 400));
    }

    #[test]
    fn test_thumbnails_never_enlarge() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        write_png(&input.join("small.png"), 100, 50);

        generate_thumbnails(&input, &output, ThumbnailBounds::default()).unwrap();

        let (w, h) = image::image_dimensions(output.join("small-thumb.webp")).unwrap();
        assert_eq!((w, h), (100, 50));
    }

    #[test]
    fn test_corrupt_input_is_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("broken.jpg"), b"definitely not a jpeg").unwrap();
        write_png(&input.join("good.png"), 4, 4);

        let summary = compress_photos(&input, &output).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.converted, 1);
        assert!(output.join("good.webp").exists());
        assert!(!output.join("broken.webp").exists());
    }
}
