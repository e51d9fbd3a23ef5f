use std::{
    env,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{anyhow, Context, Result};
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};
use visboard_core::{
    load_or_init, save_images, seeded_rng, HtmlPage, ImageBatch, LossSet, Reporter,
    ReporterOptions, VisualSet,
};

const BATCH_SIZE: usize = 4;
const CHANNELS: usize = 3;
const IMAGE_SIZE: usize = 64;
const ITERS_PER_EPOCH: u64 = 16;
const PRINT_FREQ: u64 = 4;
const GALLERY_SAMPLES: usize = 3;
const FULL_EPOCHS: u32 = 8;
const TEST_EPOCHS: u32 = 2;

enum RunMode {
    Full,
    Test,
}

impl RunMode {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let mut mode: Option<Self> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mode" | "-m" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("expected value after {}", arg))?;
                    mode = Some(Self::from_str(&value)?);
                }
                s if s.starts_with("--mode=") => {
                    let value = s.split_once('=').unwrap().1;
                    mode = Some(Self::from_str(value)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => {
                    return Err(anyhow!("unexpected argument: {}", arg));
                }
            }
        }

        Ok(mode.unwrap_or(Self::Full))
    }

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "full" => Ok(Self::Full),
            "test" => Ok(Self::Test),
            other => Err(anyhow!("invalid mode: {}", other)),
        }
    }

    fn epochs(&self) -> u32 {
        match self {
            Self::Full => FULL_EPOCHS,
            Self::Test => TEST_EPOCHS,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Test => "test",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ExperimentConfig {
    seed: u64,
}

fn main() -> Result<()> {
    let mode = RunMode::parse()?;
    let runs_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("runs");
    fs::create_dir_all(&runs_dir)
        .with_context(|| format!("failed to create runs directory {}", runs_dir.display()))?;

    let config: ExperimentConfig =
        load_or_init(&runs_dir.join("config.json"), || ExperimentConfig {
            seed: 1337,
        })?;

    let options = ReporterOptions {
        crop_size: IMAGE_SIZE as u32,
        ..ReporterOptions::new(&runs_dir, "toy_gan")
    };
    let mut reporter = Reporter::new(&options)?;
    let mut rng = seeded_rng(config.seed);

    println!(
        "running toy GAN in {} mode ({} epochs, display id {})",
        mode.label(),
        mode.epochs(),
        reporter.display_id()
    );

    let epochs = mode.epochs();
    let mut total_iters: u64 = 0;

    for epoch in 1..=epochs {
        reporter.reset();

        for iter in 1..=ITERS_PER_EPOCH {
            total_iters += 1;

            let data_start = Instant::now();
            let real = real_batch(&mut rng)?;
            let data_time = data_start.elapsed().as_secs_f64();

            let compute_start = Instant::now();
            let fake = generator_batch(&mut rng, epoch, epochs)?;
            let losses = training_losses(&mut rng, epoch, epochs, iter);
            let compute_time = compute_start.elapsed().as_secs_f64();

            if iter % PRINT_FREQ == 0 {
                let counter_ratio = iter as f64 / ITERS_PER_EPOCH as f64;
                reporter.print_current_losses(
                    total_iters,
                    &[("comp", compute_time), ("data", data_time)],
                    &losses,
                )?;
                reporter.plot_current_losses(epoch, counter_ratio, &losses);
            }

            if iter == ITERS_PER_EPOCH {
                let mut visuals = VisualSet::new();
                visuals.insert("real", real);
                visuals.insert("fake", fake);
                reporter.display_current_results(&visuals, epoch, None, 4)?;
            }
        }
    }

    write_gallery(&runs_dir, &mut rng, epochs)?;

    for (key, series) in reporter.plot_series() {
        println!("plot series {}: {} points", key, series.x.len());
    }
    println!("report written to {}", runs_dir.join("toy_gan/web").display());

    Ok(())
}

fn print_usage() {
    println!("Usage: cargo run -p visboard-experiment-toygan -- [--mode full|test]");
}

/// Final validation gallery: one section per held-out sample, with the
/// target and the generator's last output side by side.
fn write_gallery(runs_dir: &Path, rng: &mut StdRng, epochs: u32) -> Result<()> {
    let gallery_dir = runs_dir.join("toy_gan").join("gallery");
    let mut page = HtmlPage::new(&gallery_dir, "Toy GAN validation samples", 0)?;

    for sample in 0..GALLERY_SAMPLES {
        let mut visuals = VisualSet::new();
        visuals.insert("target", real_batch(rng)?);
        visuals.insert("generated", generator_batch(rng, epochs, epochs)?);

        let source = vec![PathBuf::from(format!("val_{sample:04}.png"))];
        save_images(&mut page, &visuals, &source, 1.0, IMAGE_SIZE as u32)?;
    }

    page.save()
}

/// The distribution the toy generator is chasing: a radial RGB gradient.
fn target_value(channel: usize, row: usize, col: usize) -> f32 {
    let cy = row as f32 / (IMAGE_SIZE - 1) as f32 - 0.5;
    let cx = col as f32 / (IMAGE_SIZE - 1) as f32 - 0.5;
    let radius = (cx * cx + cy * cy).sqrt() * 2.0;
    match channel {
        0 => 1.0 - radius * 2.0,
        1 => cx * 2.0,
        _ => cy * 2.0,
    }
    .clamp(-1.0, 1.0)
}

fn real_batch(rng: &mut StdRng) -> Result<ImageBatch> {
    noisy_batch(rng, 0.05)
}

/// Generator output: the target pattern under noise that decays as training
/// progresses, so the gallery visibly sharpens epoch over epoch.
fn generator_batch(rng: &mut StdRng, epoch: u32, epochs: u32) -> Result<ImageBatch> {
    let noise = 0.8 * (1.0 - epoch as f32 / epochs as f32) + 0.05;
    noisy_batch(rng, noise)
}

fn noisy_batch(rng: &mut StdRng, noise: f32) -> Result<ImageBatch> {
    let mut data = Vec::with_capacity(BATCH_SIZE * CHANNELS * IMAGE_SIZE * IMAGE_SIZE);
    for _ in 0..BATCH_SIZE {
        for channel in 0..CHANNELS {
            for row in 0..IMAGE_SIZE {
                for col in 0..IMAGE_SIZE {
                    let jitter = rng.gen_range(-noise..=noise);
                    data.push((target_value(channel, row, col) + jitter).clamp(-1.0, 1.0));
                }
            }
        }
    }
    ImageBatch::new(data, BATCH_SIZE, CHANNELS, IMAGE_SIZE, IMAGE_SIZE)
}

/// Synthetic G/D losses: exponential decay toward a floor with per-iteration
/// jitter, matching the shape of a healthy adversarial run.
fn training_losses(rng: &mut StdRng, epoch: u32, epochs: u32, iter: u64) -> LossSet {
    let progress = (epoch as f64 - 1.0 + iter as f64 / ITERS_PER_EPOCH as f64) / epochs as f64;
    let decay = (-3.0 * progress).exp();

    let mut losses = LossSet::new();
    losses.insert("G_GAN", 2.0 * decay + rng.gen_range(-0.05..=0.05) + 0.3);
    losses.insert("D_real", 0.7 * decay + rng.gen_range(-0.03..=0.03) + 0.2);
    losses.insert("D_fake", 0.7 * decay + rng.gen_range(-0.03..=0.03) + 0.2);
    losses
}
