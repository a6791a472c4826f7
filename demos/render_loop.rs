use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use deferred_shot::{
    ColorMode, ImageFileType, RowOrder, ShotConfig, ShotCoordinator, ShotEvent, ShotFormat,
    SoftwareBackend, SoftwareSurface, SourcePixelFormat,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;
const FRAMES: u32 = 240;
const FRAME_BUDGET: Duration = Duration::from_micros(16_667);

/// Scrolling diagonal bands so consecutive screenshots differ visibly.
fn draw_frame(surface: &SoftwareSurface, frame: u32) {
    surface.draw(|width, _, pixels| {
        for (i, px) in pixels.chunks_exact_mut(4).enumerate() {
            let x = i as u32 % width;
            let y = i as u32 / width;
            let band = ((x + y + frame * 4) / 32) % 2;
            let shade = (frame * 255 / FRAMES) as u8;
            px.copy_from_slice(&[
                if band == 0 { 40 } else { 220 },
                shade,
                (x * 255 / width) as u8,
                255,
            ]);
        }
    });
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let out_dir = std::env::args().nth(1).unwrap_or_else(|| "./shots".into());
    let surface = Arc::new(SoftwareSurface::new(WIDTH, HEIGHT)?);
    // GL-style readback: BGRA rows stored bottom-up.
    let backend = SoftwareBackend::new(Arc::clone(&surface))
        .with_readback_format(SourcePixelFormat::Bgra8)?
        .with_row_order(RowOrder::BottomUp);

    let mut coordinator = ShotCoordinator::builder()
        .with_backend(Arc::new(backend))
        .with_config(ShotConfig::from_env())
        .build()
        .context("failed to start screenshot coordinator")?;
    let events = coordinator.subscribe();

    // A second thread asks for a screenshot too, as an input handler would.
    let requester = coordinator.requester();
    let remote_template = format!("{out_dir}/remote_####");
    let remote = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(500));
        requester.request(remote_template, ShotFormat::new(ImageFileType::WebP))
    });

    let mut slowest = Duration::ZERO;
    for frame in 0..FRAMES {
        let begin = Instant::now();
        draw_frame(&surface, frame);

        if frame % 60 == 0 {
            coordinator.request_screenshot(format!("{out_dir}/frame_####.png"), ShotFormat::png())?;
        }
        if frame == 100 {
            coordinator.request_screenshot(
                format!("{out_dir}/still_###.jpg"),
                ShotFormat::jpeg(92).with_color_mode(ColorMode::Rgba),
            )?;
        }

        let capture_begin = Instant::now();
        coordinator.advance();
        slowest = slowest.max(capture_begin.elapsed());

        if let Some(rest) = FRAME_BUDGET.checked_sub(begin.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    remote
        .join()
        .map_err(|_| anyhow::anyhow!("requester thread panicked"))??;
    coordinator.flush();

    for event in events.try_iter() {
        match event {
            ShotEvent::Written { frame, path } => {
                println!("frame {frame}: wrote {}", path.display());
            }
            ShotEvent::Failed { frame, path, error } => {
                println!("frame {frame}: failed to write {}: {error}", path.display());
            }
        }
    }

    let stats = coordinator.stats().snapshot();
    println!(
        "{} frames, {} files written, {} failures, slowest advance {:.3} ms, avg barrier wait {:.3} ms",
        stats.frames_advanced,
        stats.files_written,
        stats.encode_failures,
        slowest.as_secs_f64() * 1000.0,
        stats.barrier_wait_avg.as_secs_f64() * 1000.0
    );
    Ok(())
}
