use std::collections::VecDeque;

/// Number of recent frame durations kept for the fps readout
pub const FRAME_WINDOW: usize = 50;

/// Sliding window of recent frame durations in milliseconds
#[derive(Debug, Clone)]
pub struct FrameTimes {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl FrameTimes {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a frame duration, evicting the oldest once full
    pub fn push(&mut self, millis: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(millis);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest first
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// Mean frame time, 0 when empty
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Frames per second over the window, 0 when there is nothing to measure
    pub fn fps(&self) -> f64 {
        let average = self.average();
        if average > 0.0 {
            1000.0 / average
        } else {
            0.0
        }
    }
}

impl Default for FrameTimes {
    fn default() -> Self {
        Self::new(FRAME_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_reports_zero() {
        let times = FrameTimes::default();
        assert_eq!(times.average(), 0.0);
        assert_eq!(times.fps(), 0.0);
    }

    #[test]
    fn fps_is_inverse_of_average() {
        let mut times = FrameTimes::default();
        times.push(20.0);
        times.push(30.0);
        assert_eq!(times.average(), 25.0);
        assert_eq!(times.fps(), 40.0);
    }

    #[test]
    fn zero_durations_do_not_divide_by_zero() {
        let mut times = FrameTimes::default();
        times.push(0.0);
        assert_eq!(times.fps(), 0.0);
    }

    #[test]
    fn window_is_bounded_and_fifo() {
        let mut times = FrameTimes::default();
        for i in 0..(FRAME_WINDOW + 7) {
            times.push(i as f64);
        }

        assert_eq!(times.len(), FRAME_WINDOW);
        assert_eq!(times.samples().next(), Some(7.0));
        assert_eq!(times.samples().last(), Some((FRAME_WINDOW + 6) as f64));
    }
}
