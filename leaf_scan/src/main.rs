// Command-line runner for the detection pipeline.
//
//   leaf_scan upload <image>    classify an image file as an upload
//   leaf_scan capture <image>   treat an image file as a camera frame
//
// Session settings come from the `LEAF_SCAN_*` environment variables.

use std::env;
use std::sync::Arc;

use anyhow::{Context, bail};
use leaf_scan::config::SessionConfig;
use leaf_scan::core_modules::camera::{CameraCapture, StillImageCamera};
use leaf_scan::core_modules::detection::DetectionResult;
use leaf_scan::core_modules::upload::{FileUpload, UploadedFile};
use leaf_scan::session::DetectionSession;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn print_result(result: &DetectionResult) {
    println!("{} ({})", result.name, result.confidence_percent());
    println!("  severity:    {}", result.severity);
    println!("  description: {}", result.description);
    println!("  treatment:   {}", result.treatment);
    println!("  analyzed at: {}", result.timestamp.to_rfc3339());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("Usage: leaf_scan <upload|capture> <image_path>");
        return Ok(());
    }
    let mode = args[1].as_str();
    let path = &args[2];

    let session = DetectionSession::from_config(&SessionConfig::from_env()).await;

    let result = match mode {
        "upload" => {
            let file = UploadedFile::read(path)
                .await
                .with_context(|| format!("reading {path}"))?;
            let mut upload = FileUpload::new();
            upload.try_select(file)?;
            session.analyze_upload(&upload).await?
        }
        "capture" => {
            let mut capture = CameraCapture::new(Arc::new(StillImageCamera::new(path)));
            capture.start().await?;
            let camera = Mutex::new(capture);
            session.capture_and_analyze(&camera).await?
        }
        other => bail!("unknown mode `{other}`, expected `upload` or `capture`"),
    };

    print_result(&result);
    Ok(())
}
