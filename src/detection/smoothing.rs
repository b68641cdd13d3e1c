use std::collections::VecDeque;

/// Exponential volume smoother with a short history
///
/// `smooth(x) = alpha * x + (1 - alpha) * previous`. A high alpha keeps the
/// detector responsive while still flattening single-frame spikes.
#[derive(Debug, Clone)]
pub struct VolumeSmoother {
    alpha: f32,
    capacity: usize,
    history: VecDeque<f32>,
}

impl VolumeSmoother {
    pub fn new(alpha: f32, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            capacity,
            history: VecDeque::with_capacity(capacity),
        }
    }

    pub fn smooth(&mut self, sample: f32) -> f32 {
        let previous = self.last();
        let smoothed = self.alpha * sample + (1.0 - self.alpha) * previous;

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(smoothed);

        smoothed
    }

    /// Most recent smoothed value (0 before the first sample)
    pub fn last(&self) -> f32 {
        self.history.back().copied().unwrap_or(0.0)
    }

    pub fn history(&self) -> impl Iterator<Item = f32> + '_ {
        self.history.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
