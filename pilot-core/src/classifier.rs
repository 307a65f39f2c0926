use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 10;
pub const CURVE_THRESHOLD: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Still,
    Straight,
    LeftCurve,
    RightCurve,
}

impl SectionType {
    /// Single-letter direction code used in track strings. `Still` is only
    /// the launch state and never appears in a track string.
    pub fn code(self) -> Option<char> {
        match self {
            SectionType::Still => None,
            SectionType::Straight => Some('S'),
            SectionType::LeftCurve => Some('L'),
            SectionType::RightCurve => Some('R'),
        }
    }

    fn is_curve(self) -> bool {
        matches!(self, SectionType::LeftCurve | SectionType::RightCurve)
    }
}

/// Turns a run of smoothed angular-rate values into section-transition
/// events. A transition is only announced when the whole buffered run agrees
/// on a section that differs from the current one; while the vehicle keeps
/// curving the same way nothing is emitted.
#[derive(Debug, Clone)]
pub struct SectionClassifier {
    recent: VecDeque<f64>,
    capacity: usize,
    current: SectionType,
}

impl SectionClassifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
            current: SectionType::Still,
        }
    }

    pub fn current(&self) -> SectionType {
        self.current
    }

    pub fn classify(&mut self, smoothed: f64) -> Option<SectionType> {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(smoothed);
        if self.recent.len() < self.capacity {
            return None;
        }

        let next = if !self.current.is_curve() && self.all(|v| v < -CURVE_THRESHOLD) {
            SectionType::LeftCurve
        } else if !self.current.is_curve() && self.all(|v| v > CURVE_THRESHOLD) {
            SectionType::RightCurve
        } else if self.current != SectionType::Straight
            && self.all(|v| (-CURVE_THRESHOLD..=CURVE_THRESHOLD).contains(&v))
        {
            SectionType::Straight
        } else {
            return None;
        };

        self.current = next;
        Some(next)
    }

    fn all(&self, predicate: impl Fn(f64) -> bool) -> bool {
        self.recent.iter().copied().all(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(classifier: &mut SectionClassifier, value: f64, count: usize) -> Option<SectionType> {
        let mut last = None;
        for _ in 0..count {
            if let Some(section) = classifier.classify(value) {
                last = Some(section);
            }
        }
        last
    }

    #[test]
    fn nothing_is_announced_while_the_buffer_fills() {
        let mut classifier = SectionClassifier::new(10);
        for _ in 0..9 {
            assert_eq!(classifier.classify(-900.0), None);
        }
        assert_eq!(classifier.classify(-900.0), Some(SectionType::LeftCurve));
    }

    #[test]
    fn unanimous_runs_classify_left_right_and_straight() {
        let mut classifier = SectionClassifier::new(10);
        assert_eq!(feed(&mut classifier, -700.0, 10), Some(SectionType::LeftCurve));
        assert_eq!(feed(&mut classifier, 0.0, 20), Some(SectionType::Straight));
        assert_eq!(feed(&mut classifier, 700.0, 20), Some(SectionType::RightCurve));
    }

    #[test]
    fn the_current_section_is_not_reannounced() {
        let mut classifier = SectionClassifier::new(10);
        assert_eq!(feed(&mut classifier, 900.0, 10), Some(SectionType::RightCurve));
        // still curving the same way, hysteresis keeps it quiet
        assert_eq!(feed(&mut classifier, 900.0, 50), None);
    }

    #[test]
    fn curves_only_change_through_a_straight() {
        let mut classifier = SectionClassifier::new(10);
        assert_eq!(feed(&mut classifier, -900.0, 10), Some(SectionType::LeftCurve));
        // an immediate opposite curve is not believed
        assert_eq!(feed(&mut classifier, 900.0, 50), None);
        assert_eq!(feed(&mut classifier, 0.0, 20), Some(SectionType::Straight));
        assert_eq!(feed(&mut classifier, 900.0, 20), Some(SectionType::RightCurve));
    }

    #[test]
    fn launch_state_transitions_into_straight() {
        let mut classifier = SectionClassifier::new(10);
        assert_eq!(classifier.current(), SectionType::Still);
        assert_eq!(feed(&mut classifier, 10.0, 10), Some(SectionType::Straight));
        assert_eq!(classifier.current(), SectionType::Straight);
    }

    #[test]
    fn boundary_values_count_as_straight() {
        let mut classifier = SectionClassifier::new(10);
        assert_eq!(feed(&mut classifier, -500.0, 10), Some(SectionType::Straight));
    }
}
