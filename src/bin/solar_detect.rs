//! solar-detect - classify one image or one address from the command line

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use solar_detector::annotate::save_jpeg;
use solar_detector::config::AppConfig;
use solar_detector::ui::{Ui, UiMode};
use solar_detector::{
    load_backend, AddressQuery, Classifier, DetectionService, ImageryClient, MessagePool,
};

/// CLI runs use a slightly stricter threshold than the web UI.
const CLI_CONFIDENCE: f32 = 0.5;
const CLI_ZOOM: u8 = 20;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect solar panels in a local image or in satellite imagery of an address"
)]
struct Args {
    /// Street address to fetch satellite imagery for.
    #[arg(long, conflicts_with = "image", required_unless_present = "image")]
    address: Option<String>,

    /// Local image to classify instead of fetching imagery.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Google Maps API key (falls back to GOOGLE_MAPS_API_KEY, then the credential file).
    #[arg(long, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Credential file holding {"google_maps_api_key": "..."}.
    #[arg(long)]
    secret: Option<PathBuf>,

    /// Zoom level for satellite imagery.
    #[arg(long, default_value_t = CLI_ZOOM)]
    zoom: u8,

    /// Confidence threshold in [0, 1].
    #[arg(long, default_value_t = CLI_CONFIDENCE)]
    conf: f32,

    /// Also save the annotated image here (JPEG) as part of classification.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Write the annotated image here (JPEG) after printing the result.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Output mode: auto, plain, or pretty.
    #[arg(long, default_value = "auto")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = Ui::detect(UiMode::parse(&args.ui)?);

    let mut config = AppConfig::load()?;
    if let Some(secret) = &args.secret {
        config.use_secret_file(secret)?;
    }

    let backend = ui
        .stage("load detector")
        .run(|| load_backend(&config.detector))?;

    let mut classifier = Classifier::new(backend)
        .with_messages(MessagePool::for_style(config.output.messages))
        .with_confidence(args.conf)?;
    if let Some(path) = &args.save {
        classifier = classifier.with_save_path(path);
    }

    let classification = match (&args.image, &args.address) {
        (Some(path), _) => ui
            .stage("classify image")
            .run(|| classifier.classify_path(path))
            .with_context(|| format!("failed to classify {}", path.display()))?,
        (None, Some(address)) => {
            let service = DetectionService::new(
                classifier,
                ImageryClient::new(config.imagery.client_config()),
                config.api_key.clone(),
                args.zoom,
                config.imagery.size.clone(),
            );
            let query = AddressQuery {
                address: address.clone(),
                api_key: args.api_key.clone(),
                zoom: Some(args.zoom),
            };
            let result = ui
                .stage("fetch imagery + classify")
                .run(|| service.detect_address(&query))?;
            println!("imagery: {}", result.image_path.display());
            result.classification
        }
        (None, None) => return Err(anyhow!("either --address or --image is required")),
    };

    println!("{}", classification.message);
    for detection in classification.detections.detections() {
        println!(
            "  box ({:.0}, {:.0})-({:.0}, {:.0}) conf {:.2}",
            detection.bbox.x1,
            detection.bbox.y1,
            detection.bbox.x2,
            detection.bbox.y2,
            detection.confidence
        );
    }

    if let Some(out) = &args.out {
        save_jpeg(&classification.annotated, out)?;
        println!("annotated image: {}", out.display());
    }

    Ok(())
}
