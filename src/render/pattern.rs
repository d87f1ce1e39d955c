//! CPU test-pattern render instance
//!
//! Stands in for the GPU pipeline: every tick drains pending control input,
//! paints a BGRA gradient shifted by the accumulated pointer state and the
//! elapsed time, and hands the buffer to the frame sink.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::scheduler::RealtimeScheduler;
use super::{FrameSink, RenderInstance};
use crate::error::{AppError, Result};
use crate::input::{InputReceiver, PointerState};

const BYTES_PER_PIXEL: u32 = 4;

/// Pattern renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternRendererConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for PatternRendererConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 544,
            fps: 60,
        }
    }
}

impl PatternRendererConfig {
    pub fn row_pitch(&self) -> u32 {
        self.width * BYTES_PER_PIXEL
    }
}

/// State shared with the tick thread
struct Canvas {
    input: InputReceiver,
    pointer: PointerState,
    buffer: Vec<u8>,
}

impl Canvas {
    fn tick(&mut self, config: &PatternRendererConfig, elapsed: f64, sink: &dyn FrameSink) {
        self.input.drain_into(&mut self.pointer);
        self.paint(config, elapsed);
        sink.on_frame(&self.buffer, config.width, config.height, config.row_pitch());
    }

    fn paint(&mut self, config: &PatternRendererConfig, elapsed: f64) {
        let phase = (elapsed * 60.0) as i64;
        let PointerState { x, y, z } = self.pointer;
        let pitch = config.row_pitch() as usize;

        for (row, line) in self.buffer.chunks_exact_mut(pitch).enumerate() {
            let g = (row as i64 + y) as u8;
            for (col, pixel) in line.chunks_exact_mut(BYTES_PER_PIXEL as usize).enumerate() {
                pixel[0] = (col as i64 + x + phase) as u8;
                pixel[1] = g;
                pixel[2] = z as u8;
                pixel[3] = 0xff;
            }
        }
    }
}

/// Render instance painting a moving gradient
pub struct PatternRenderer {
    identifier: String,
    config: PatternRendererConfig,
    sink: Arc<dyn FrameSink>,
    canvas: Arc<Mutex<Canvas>>,
    scheduler: Option<RealtimeScheduler>,
}

impl PatternRenderer {
    pub fn new(
        identifier: impl Into<String>,
        config: PatternRendererConfig,
        input: InputReceiver,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        let buffer = vec![0u8; (config.row_pitch() * config.height) as usize];
        Self {
            identifier: identifier.into(),
            config,
            sink,
            canvas: Arc::new(Mutex::new(Canvas {
                input,
                pointer: PointerState::default(),
                buffer,
            })),
            scheduler: None,
        }
    }

    /// Pointer state accumulated so far
    pub fn pointer(&self) -> PointerState {
        self.canvas.lock().pointer
    }
}

impl RenderInstance for PatternRenderer {
    fn start(&mut self) -> Result<()> {
        if self.scheduler.is_some() {
            return Ok(());
        }
        if self.config.width == 0 || self.config.height == 0 {
            return Err(AppError::Render(format!(
                "invalid frame size {}x{}",
                self.config.width, self.config.height
            )));
        }

        let config = self.config.clone();
        let canvas = self.canvas.clone();
        let sink = self.sink.clone();
        let scheduler = RealtimeScheduler::with_rate(
            format!("render-{}", self.identifier),
            self.config.fps,
            move |elapsed| canvas.lock().tick(&config, elapsed, sink.as_ref()),
        )?;

        info!(
            "Rendering {}x{}@{} for {}",
            self.config.width, self.config.height, self.config.fps, self.identifier
        );
        self.scheduler = Some(scheduler);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
            debug!("Rendering stopped for {}", self.identifier);
        }
    }

    fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }
}

impl Drop for PatternRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}
