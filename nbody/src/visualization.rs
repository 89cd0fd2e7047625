//! Handoff of step results to whatever renders them.

/// One step's worth of render data. Borrowed from the driver's host arrays,
/// which no device write can touch while the view exists.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    /// Normalized positions, three floats per body.
    pub positions: &'a [f32],
    /// RGB per body, fixed since the scene was generated.
    pub colors: &'a [f32],
    pub step: u64,
    pub time: f64,
}

impl FrameView<'_> {
    /// Mean normalized position of all bodies.
    pub fn centroid(&self) -> [f32; 3] {
        let bodies = self.positions.len() / 3;
        if bodies == 0 {
            return [0.0; 3];
        }
        let mut sum = [0.0f64; 3];
        for body in self.positions.chunks_exact(3) {
            for (acc, p) in sum.iter_mut().zip(body) {
                *acc += *p as f64;
            }
        }
        sum.map(|s| (s / bodies as f64) as f32)
    }
}

/// Consumer of post-step frames.
pub trait VisualizationAdapter {
    fn present(&mut self, frame: FrameView<'_>);
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAdapter;

impl VisualizationAdapter for NullAdapter {
    fn present(&mut self, _frame: FrameView<'_>) {}
}

/// Logs a one-line summary of each frame at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAdapter;

impl VisualizationAdapter for LogAdapter {
    fn present(&mut self, frame: FrameView<'_>) {
        if log::log_enabled!(log::Level::Debug) {
            let [x, y, z] = frame.centroid();
            log::debug!(
                "step {} t={}: centroid ({x:.4}, {y:.4}, {z:.4})",
                frame.step,
                frame.time
            );
        }
    }
}

impl<A: VisualizationAdapter + ?Sized> VisualizationAdapter for &mut A {
    fn present(&mut self, frame: FrameView<'_>) {
        (**self).present(frame);
    }
}

/// Hands every frame to both adapters, in order.
impl<A: VisualizationAdapter, B: VisualizationAdapter> VisualizationAdapter for (A, B) {
    fn present(&mut self, frame: FrameView<'_>) {
        self.0.present(frame);
        self.1.present(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Steps(Vec<u64>);

    impl VisualizationAdapter for Steps {
        fn present(&mut self, frame: FrameView<'_>) {
            self.0.push(frame.step);
        }
    }

    #[test]
    fn pair_presents_to_both() {
        let mut pair = (Steps(Vec::new()), Steps(Vec::new()));
        for step in 1..=2 {
            pair.present(FrameView {
                positions: &[],
                colors: &[],
                step,
                time: 0.0,
            });
        }
        assert_eq!(pair.0.0, vec![1, 2]);
        assert_eq!(pair.1.0, vec![1, 2]);
    }

    #[test]
    fn centroid_averages_bodies() {
        let positions = [1.0, 0.0, -1.0, -1.0, 0.5, 0.0];
        let frame = FrameView {
            positions: &positions,
            colors: &[],
            step: 1,
            time: 1.0,
        };
        assert_eq!(frame.centroid(), [0.0, 0.25, -0.5]);
    }

    #[test]
    fn centroid_of_nothing_is_origin() {
        let frame = FrameView {
            positions: &[],
            colors: &[],
            step: 0,
            time: 0.0,
        };
        assert_eq!(frame.centroid(), [0.0; 3]);
    }
}
