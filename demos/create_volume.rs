//! Example: write a synthetic post-stack volume to SEG-Y and inspect the result
//!
//! Run with: RUST_LOG=segy=debug cargo run --example create_volume

use ndarray::Array3;
use segy::{
    create, header::TEXT_HEADER_SIZE, BinaryHeader, CreationConfig, TextHeader, VolumeShape,
};
use tracing_subscriber::EnvFilter;

/// Dipping reflectors with a Ricker-like wavelet
fn synthetic_volume(shape: VolumeShape) -> Array3<f32> {
    Array3::from_shape_fn(shape.as_tuple(), |(z, y, x)| {
        let depth = x as f32 - 0.15 * z as f32 - 0.08 * y as f32;
        let phase = (depth % 40.0) - 20.0;
        let a = (phase / 4.0).powi(2);
        (1.0 - 2.0 * a) * (-a).exp() * 1000.0
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("SEG-Y Rust Example: Create Volume");
    println!("=================================\n");

    let shape = VolumeShape::new(60, 80, 500);
    let config = CreationConfig::builder(shape.size_z, shape.size_y, shape.size_x)
        .format_code(1)
        .sample_interval(4000)
        .min_inline(1000)
        .min_crossline(2000)
        .x_interval(12.5)
        .y_interval(12.5)
        .build()?;

    println!("Volume: {} (inline, crossline, sample)", shape);
    println!("Format: {}", config.data_format());
    println!();

    let out_dir = tempfile::tempdir()?;
    let path = out_dir.path().join("synthetic.segy");
    let summary = create(&path, synthetic_volume(shape), config).await?;

    println!("{}", summary.summary());
    println!("{}\n", summary.to_json()?);

    // Read the headers back
    let bytes = tokio::fs::read(&path).await?;
    let text = TextHeader::from_bytes(&bytes)?;
    for line in text.lines().iter().take(8) {
        println!("  {}", line.trim_end());
    }
    let binary = BinaryHeader::from_bytes(&bytes[TEXT_HEADER_SIZE..])?;
    println!(
        "\nBinary header: dt = {} us, ns = {}, format = {}",
        binary.sample_interval, binary.samples_per_trace, binary.data_format
    );

    Ok(())
}
