use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::driver::CancelToken;
use crate::visualization::{FrameView, VisualizationAdapter};

/// Primitive for communicating between simulation and graphics.
///
/// The simulation offers every frame; a frame is only copied when the
/// consumer has taken the previous one. The consumer can also stop the run.
pub struct BatchRequest {
    sample: Mutex<Vec<f32>>,
    colors: Vec<f32>,
    should_sample: AtomicBool,
    simulation_tick: AtomicU64,
    time: AtomicU64,
    cancel: CancelToken,
}

impl BatchRequest {
    pub fn new(colors: &[f32], cancel: CancelToken) -> Self {
        Self {
            sample: Mutex::new(vec![0.0; colors.len()]),
            colors: colors.to_vec(),
            should_sample: AtomicBool::new(true),
            simulation_tick: AtomicU64::new(0),
            time: AtomicU64::new(0.0f64.to_bits()),
            cancel,
        }
    }

    /// Return whether we are ready to a accept a new simulation batch.
    pub fn should_store(&self) -> bool {
        self.should_sample
            .compare_exchange_weak(true, false, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Store the frame's positions, as well as the current tick.
    pub fn store(&self, frame: &FrameView<'_>) {
        self.simulation_tick.store(frame.step, Ordering::Relaxed);
        self.time.store(frame.time.to_bits(), Ordering::Relaxed);
        match self.sample.lock() {
            Ok(mut data) => data.copy_from_slice(frame.positions),
            Err(_) => self.poisoned(),
        }
    }

    /// Copy the latest positions into `out`, and request a new sample from the
    /// simulation. Returns the tick the sample was taken at.
    pub fn sample(&self, out: &mut Vec<f32>) -> u64 {
        match self.sample.lock() {
            Ok(data) => {
                out.clear();
                out.extend_from_slice(&data);
            }
            Err(_) => self.poisoned(),
        }
        self.should_sample.store(true, Ordering::Relaxed);
        self.current_ticks()
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn current_ticks(&self) -> u64 {
        self.simulation_tick.load(Ordering::Relaxed)
    }

    pub fn current_time(&self) -> f64 {
        f64::from_bits(self.time.load(Ordering::Relaxed))
    }

    /// Ask the simulation to stop after the step in flight.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// A thread panicked while holding the sample, so no later frame can be
    /// trusted.
    fn poisoned(&self) {
        log::error!("Frame exchange poisoned, stopping the simulation");
        self.request_stop();
    }
}

impl VisualizationAdapter for &BatchRequest {
    fn present(&mut self, frame: FrameView<'_>) {
        if self.should_store() {
            self.store(&frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame<'a>(positions: &'a [f32], step: u64) -> FrameView<'a> {
        FrameView {
            positions,
            colors: &[],
            step,
            time: step as f64 * 2.0,
        }
    }

    #[test]
    fn only_stores_when_sample_was_taken() {
        let request = BatchRequest::new(&[0.0, 0.0, 1.0], CancelToken::new());
        let mut adapter = &request;

        adapter.present(frame(&[1.0, 2.0, 3.0], 1));
        adapter.present(frame(&[4.0, 5.0, 6.0], 2));

        let mut out = Vec::new();
        assert_eq!(request.sample(&mut out), 1);
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
        assert_eq!(request.current_time(), 2.0);

        adapter.present(frame(&[7.0, 8.0, 9.0], 3));
        assert_eq!(request.sample(&mut out), 3);
        assert_eq!(out, vec![7.0, 8.0, 9.0]);
        assert_eq!(request.colors(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn poisoned_exchange_stops_the_run() {
        let token = CancelToken::new();
        let request = BatchRequest::new(&[0.0; 3], token.clone());
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = request.sample.lock().unwrap();
            panic!("consumer died mid-copy");
        }));
        assert!(request.sample.is_poisoned());

        let mut adapter = &request;
        adapter.present(frame(&[1.0, 2.0, 3.0], 1));
        assert!(token.is_cancelled());

        let token = CancelToken::new();
        let request = BatchRequest::new(&[0.0; 3], token.clone());
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = request.sample.lock().unwrap();
            panic!("producer died mid-copy");
        }));
        request.sample(&mut Vec::new());
        assert!(token.is_cancelled());
    }

    #[test]
    fn stop_request_cancels_token() {
        let token = CancelToken::new();
        let request = BatchRequest::new(&[], token.clone());
        assert!(!token.is_cancelled());
        request.request_stop();
        assert!(token.is_cancelled());
    }
}
