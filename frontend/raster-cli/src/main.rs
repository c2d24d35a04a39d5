mod queue;
mod scene;

use crate::scene::{DemoHooks, Scene};
use anyhow::anyhow;
use clap::Parser;
use env_logger::Env;
use gba_raster::handoff::{self, FrameSender, RecvFrameError};
use gba_raster::{FrameAssembler, Ppu, state};
use image::RgbaImage;
use raster_common::frontend::{Color, FrameSize, Renderer};
use raster_config::{RasterConfig, RenderMode};
use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

const RECV_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Parser)]
struct Args {
    /// TOML config file path; a missing file falls back to defaults
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of frames to render
    #[arg(short = 'n', long, default_value_t = 60)]
    frames: u32,

    /// Path to write the last presented frame to, as PNG
    #[arg(short = 'o', long, default_value = "frame.png")]
    output: PathBuf,

    /// Override the config's render mode
    #[arg(long)]
    render_mode: Option<RenderMode>,

    /// Override the config's output surface width
    #[arg(long)]
    output_width: Option<u32>,

    /// Override the config's output surface height
    #[arg(long)]
    output_height: Option<u32>,

    /// Draw a border around the native raster when the output surface is larger
    #[arg(long)]
    border: bool,

    /// Write a snapshot of the final compositor state to this path
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print the effective config as TOML and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn raster_config(&self) -> RasterConfig {
        let mut config = self.config.as_ref().map(RasterConfig::from_file).unwrap_or_default();

        if let Some(render_mode) = self.render_mode {
            config.render_mode = render_mode;
        }
        if let Some(output_width) = self.output_width {
            config.output_width = output_width;
        }
        if let Some(output_height) = self.output_height {
            config.output_height = output_height;
        }
        config.border |= self.border;

        config
    }
}

/// Keeps a copy of the most recently presented frame
#[derive(Debug, Default)]
struct CapturingRenderer {
    last_frame: Vec<Color>,
    last_size: Option<FrameSize>,
    frames_presented: u64,
}

impl Renderer for CapturingRenderer {
    type Err = Infallible;

    fn render_frame(
        &mut self,
        frame_buffer: &[Color],
        frame_size: FrameSize,
    ) -> Result<(), Self::Err> {
        self.last_frame.clear();
        self.last_frame.extend_from_slice(&frame_buffer[..frame_size.len()]);
        self.last_size = Some(frame_size);
        self.frames_presented += 1;

        Ok(())
    }
}

fn run_logic(config: RasterConfig, frames: u32, mut sender: FrameSender) -> anyhow::Result<Ppu> {
    let mut ppu = Ppu::new(&config);
    let mut assembler = FrameAssembler::new(&config);
    let mut hooks = DemoHooks::default();

    let mut scene = Scene::build(&mut ppu, &mut hooks.transfer);
    hooks.transfer.apply(&mut ppu);

    for frame in 0..frames {
        scene.advance(&mut ppu, &mut hooks.transfer, frame);

        let frame_buffer = assembler.render_frame(&mut ppu, &mut hooks);
        sender.send_frame(frame_buffer)?;

        // Covers the V-blank hook being disabled in the config
        hooks.transfer.apply(&mut ppu);
    }

    log::info!("Rendered {frames} frames");

    Ok(ppu)
}

fn write_png(renderer: &CapturingRenderer, path: &Path) -> anyhow::Result<()> {
    let Some(size) = renderer.last_size else {
        log::warn!("No frames were presented; not writing {}", path.display());
        return Ok(());
    };

    let image = RgbaImage::from_raw(
        size.width,
        size.height,
        bytemuck::cast_slice(&renderer.last_frame).to_vec(),
    )
    .ok_or_else(|| anyhow!("Frame buffer does not match frame size {}x{}", size.width, size.height))?;
    image.save(path)?;

    log::info!("Wrote {}x{} frame to {}", size.width, size.height, path.display());

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.raster_config();

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    log::info!("Running with config {config:?}");

    let (sender, presenter) = handoff::channel();
    let frames = args.frames;
    let logic = thread::Builder::new()
        .name("logic".into())
        .spawn(move || run_logic(config, frames, sender))?;

    let mut renderer = CapturingRenderer::default();
    loop {
        match presenter.recv_frame(&mut renderer, RECV_TIMEOUT) {
            Ok(()) => {}
            Err(RecvFrameError::Recv(RecvTimeoutError::Timeout)) => {
                if logic.is_finished() {
                    break;
                }
            }
            Err(RecvFrameError::Recv(RecvTimeoutError::Disconnected)) => break,
            Err(err) => return Err(err.into()),
        }
    }

    let ppu = logic.join().map_err(|_| anyhow!("Logic thread panicked"))??;

    log::info!("Presented {} frames", renderer.frames_presented);

    write_png(&renderer, &args.output)?;

    if let Some(snapshot_path) = &args.snapshot {
        let snapshot = state::save_snapshot(&ppu)?;
        fs::write(snapshot_path, snapshot)?;
        log::info!("Wrote snapshot to {}", snapshot_path.display());
    }

    Ok(())
}
