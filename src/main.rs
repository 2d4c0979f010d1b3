use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::{bail, Result};
use clap::Parser;
use log::{error, info};
use prometheus::Encoder;
use reqwest::{multipart::Form, Client};
use upload_progress::{
    send_form, BytesBody, Config, CountingBody, Fanout, FileBody, LogProgress, MetricsProgress,
    ProgressListener,
};
use url::Url;

lazy_static::lazy_static! {
    static ref ARGS: Args = Args::parse();

    static ref CONFIG_PATH: PathBuf = {
        let var = std::env::var("UPLOAD_CONFIG").unwrap_or_default();
        if var.is_empty() {
            "./upload.yaml".parse().unwrap()
        } else {
            var.parse().expect("invalid config path")
        }
    };
    static ref CONFIG: Config = Config::load(&CONFIG_PATH).expect("failed to load config file");
}

fn parse_text_field(raw: &str) -> Result<(String, String), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected key=value, got {raw:?}"));
    };
    Ok((key.to_string(), value.to_string()))
}

/// Multipart upload with progress reporting
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// File to upload
    #[clap(short, long, required_unless_present = "zeros", conflicts_with = "zeros")]
    file: Option<PathBuf>,
    /// Upload this many zero bytes instead of a file
    #[clap(short, long)]
    zeros: Option<usize>,
    /// File name sent for --zeros uploads
    #[clap(long, default_value = "test_zero.png")]
    name: String,
    /// Media type of the uploaded part
    #[clap(short, long)]
    mime: Option<String>,
    /// Multipart field name for the upload (overrides config)
    #[clap(long)]
    field: Option<String>,
    /// Extra text field, as key=value
    #[clap(short, long, value_parser = parse_text_field)]
    text: Vec<(String, String)>,
    /// Destination URL (overrides config)
    #[clap(short, long)]
    url: Option<Url>,
}

async fn run() -> Result<()> {
    let field = ARGS.field.clone().unwrap_or_else(|| CONFIG.field.clone());
    let url = ARGS.url.clone().unwrap_or_else(|| CONFIG.url.clone());

    let mut listeners: Vec<Arc<dyn ProgressListener>> = Vec::new();
    listeners.push(Arc::new(LogProgress::new(field.clone())));
    if CONFIG.metrics {
        listeners.push(Arc::new(MetricsProgress::new(field.clone())));
    }
    let listener = Arc::new(Fanout(listeners));

    let (body, file_name) = match (&ARGS.file, ARGS.zeros) {
        (Some(path), _) => {
            let body = FileBody::new(ARGS.mime.clone(), path);
            let file_name = body.file_name();
            (CountingBody::new(body, listener), file_name)
        }
        (None, Some(len)) => (
            CountingBody::new(BytesBody::new(ARGS.mime.clone(), vec![0u8; len]), listener),
            Some(ARGS.name.clone()),
        ),
        (None, None) => bail!("either --file or --zeros is required"),
    };
    let part = body
        .with_buffer_capacity(CONFIG.buffer_capacity)
        .into_part(file_name, CONFIG.pipe_capacity)?;

    let mut form = Form::new();
    for (key, value) in &ARGS.text {
        form = form.text(key.clone(), value.clone());
    }
    let form = form.part(field, part);

    let client = Client::builder().timeout(CONFIG.timeout()).build()?;
    info!("uploading to {url}");
    let start = Instant::now();
    let response = send_form(&client, url, form).await?;
    info!(
        "upload finished in {:.02} ms",
        start.elapsed().as_secs_f64() * 1000.0
    );
    println!("{response}");

    if CONFIG.metrics {
        let mut buffer = Vec::new();
        prometheus::TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        print!("{}", String::from_utf8_lossy(&buffer));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    lazy_static::initialize(&ARGS);

    env_logger::Builder::new()
        .parse_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    if let Err(e) = run().await {
        error!("upload failed: {e:#}");
        std::process::exit(1);
    }
}
