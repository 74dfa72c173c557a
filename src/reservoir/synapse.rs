#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Presynaptic end of a synapse.
pub enum SynapseSource {
    /// Index of an input neuron (input variable).
    Input(usize),
    /// Index of a hidden neuron.
    Hidden(usize),
}

/// Weighted connection that delivers its signal exactly `delay` steps late.
///
/// The delay line is a fixed ring buffer of `delay + 1` slots: every pull stores the
/// newest presynaptic value and emits the value stored `delay` pulls ago (zero until
/// the line has filled).
#[derive(Debug, Clone, PartialEq)]
pub struct Synapse {
    pub source: SynapseSource,
    pub weight: f64,
    delay: usize,
    queue: Vec<f64>,
    head: usize,
}

impl Synapse {
    pub fn new(source: SynapseSource, weight: f64, delay: usize) -> Self {
        Self {
            source,
            weight,
            delay,
            queue: vec![0.0; delay + 1],
            head: 0,
        }
    }

    #[inline]
    pub fn delay(&self) -> usize {
        self.delay
    }

    /// Push the current presynaptic value, return the weighted delayed signal.
    #[inline]
    pub fn pull(&mut self, presynaptic: f64) -> f64 {
        self.queue[self.head] = presynaptic;
        self.head += 1;
        if self.head == self.queue.len() {
            self.head = 0;
        }
        self.weight * self.queue[self.head]
    }

    /// Empty the delay line.
    pub fn reset(&mut self) {
        self.queue.fill(0.0);
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_three_emits_after_three_pulls() {
        let mut s = Synapse::new(SynapseSource::Hidden(0), 1.0, 3);
        let out: Vec<f64> = [1.0, 2.0, 3.0, 4.0, 5.0]
            .into_iter()
            .map(|v| s.pull(v))
            .collect();
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn zero_delay_is_immediate_and_weighted() {
        let mut s = Synapse::new(SynapseSource::Input(2), -0.5, 0);
        assert_eq!(s.pull(4.0), -2.0);
        assert_eq!(s.pull(1.0), -0.5);
    }

    #[test]
    fn reset_empties_the_line() {
        let mut s = Synapse::new(SynapseSource::Input(0), 1.0, 1);
        s.pull(7.0);
        s.reset();
        assert_eq!(s.pull(1.0), 0.0);
        assert_eq!(s.pull(2.0), 1.0);
    }
}
