use pilot_protocol::{SensorEvent, VelocityEvent};
use tracing::{debug, info, warn};

use crate::classifier::{self, SectionClassifier, SectionType};
use crate::pattern;
use crate::smoothing::{self, SignalSmoother};
use crate::tracker::{PositionTracker, Resync};

pub const MAX_POWER: f64 = 255.0;
pub const INITIAL_POWER: f64 = 100.0;

const STANDSTILL_DISPERSION: f64 = 5.0;
const RAMP_STEP: f64 = 1.0;
const PROBE_STEP: f64 = 3.0;
const PENALTY_STEP: f64 = 10.0;
const STRAIGHT_BOOST: f64 = 30.0;
const BOOST_UPGRADE_STEP: f64 = 2.0;
const BOOST_DOWNGRADE_STEP: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Warmup,
    Discovery,
    SafeSpeed,
    Lost,
    Optimize,
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Minimum time between two power increases while probing on a moving
    /// vehicle.
    pub probe_interval_ms: i64,
    /// How long the track string may grow without a lap emerging before the
    /// whole state is reset.
    pub discovery_timeout_ms: i64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 1500,
            discovery_timeout_ms: 60_000,
        }
    }
}

/// One section of the discovered lap and the power profile attached to it.
#[derive(Debug, Clone)]
pub struct TrackSection {
    pub direction: char,
    pub entry_power: f64,
    pub leaving_power: f64,
    pub duration_ms: i64,
    pub boost_window_ms: i64,
    /// Set once a penalty was earned in this section; a locked section is
    /// never upgraded again.
    pub locked: bool,
}

impl TrackSection {
    fn provisional(direction: char, power: f64) -> Self {
        Self {
            direction,
            entry_power: power,
            leaving_power: power,
            duration_ms: 0,
            boost_window_ms: 0,
            locked: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StrategyEvent {
    RaceStart,
    Sensor(SensorEvent),
    Velocity(VelocityEvent),
    Penalty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerCommand {
    value: u8,
}

impl PowerCommand {
    pub fn zero() -> Self {
        Self { value: 0 }
    }

    pub fn from_level(level: f64) -> Self {
        Self {
            value: level.clamp(0.0, MAX_POWER) as u8,
        }
    }

    pub fn value(self) -> u8 {
        self.value
    }
}

#[derive(Debug, Clone, Copy)]
struct BoostWindow {
    deadline_ms: i64,
    leaving_power: f64,
    section: usize,
}

/// The race strategy proper. A total function of (state, event): every event
/// produces at most one power command and never fails.
#[derive(Debug)]
pub struct StrategyStateMachine {
    config: StrategyConfig,
    phase: Phase,
    resume_phase: Phase,
    smoother: SignalSmoother,
    classifier: SectionClassifier,
    tracker: PositionTracker,
    current_power: f64,
    safe_power: f64,
    probing: bool,
    last_increase_ms: i64,
    discovery_started_ms: Option<i64>,
    seen_first_transition: bool,
    track: String,
    transition_times: Vec<i64>,
    lap: String,
    map: Vec<TrackSection>,
    boost: Option<BoostWindow>,
    last_entered: Option<usize>,
    section_penalized: bool,
}

impl StrategyStateMachine {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            phase: Phase::Warmup,
            resume_phase: Phase::SafeSpeed,
            smoother: SignalSmoother::new(smoothing::DEFAULT_WINDOW),
            classifier: SectionClassifier::new(classifier::DEFAULT_WINDOW),
            tracker: PositionTracker::new(),
            current_power: 0.0,
            safe_power: INITIAL_POWER,
            probing: true,
            last_increase_ms: 0,
            discovery_started_ms: None,
            seen_first_transition: false,
            track: String::new(),
            transition_times: Vec::new(),
            lap: String::new(),
            map: Vec::new(),
            boost: None,
            last_entered: None,
            section_penalized: false,
            config,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_power(&self) -> f64 {
        self.current_power
    }

    pub fn safe_power(&self) -> f64 {
        self.safe_power
    }

    pub fn is_probing(&self) -> bool {
        self.probing
    }

    pub fn track(&self) -> &str {
        &self.track
    }

    pub fn lap(&self) -> &str {
        &self.lap
    }

    pub fn position(&self) -> usize {
        self.tracker.index()
    }

    pub fn track_map(&self) -> &[TrackSection] {
        &self.map
    }

    pub fn handle(&mut self, event: StrategyEvent) -> Option<PowerCommand> {
        match event {
            StrategyEvent::RaceStart => {
                self.reset();
                None
            }
            StrategyEvent::Penalty => Some(self.on_penalty()),
            StrategyEvent::Sensor(sensor) => Some(self.on_sensor(&sensor)),
            // velocity mode carries no strategy signal
            StrategyEvent::Velocity(_) => None,
        }
    }

    fn on_sensor(&mut self, sensor: &SensorEvent) -> PowerCommand {
        let smoothed = self.smoother.push(sensor.gyro_z());
        let transition = self.classifier.classify(smoothed);

        match self.phase {
            Phase::Warmup => self.warmup(sensor),
            Phase::Discovery => self.discover(sensor, transition),
            Phase::SafeSpeed => self.safe_speed(sensor, transition),
            Phase::Lost => self.lost(transition),
            Phase::Optimize => self.optimize(sensor, transition),
        }

        PowerCommand::from_level(self.current_power)
    }

    /// Ramp quickly out of the standstill friction band, then hand over to
    /// track discovery once the vehicle is actually moving at launch power.
    fn warmup(&mut self, sensor: &SensorEvent) {
        if self.standing_still() || self.current_power < INITIAL_POWER {
            self.increase(RAMP_STEP);
        } else {
            info!(power = self.current_power, "vehicle launched, mapping the track");
            self.phase = Phase::Discovery;
            self.discovery_started_ms = Some(sensor.timestamp_ms);
        }
    }

    fn discover(&mut self, sensor: &SensorEvent, transition: Option<SectionType>) {
        // a reset mid-discovery drops power back to zero, so the launch ramp
        // stays active here as well
        if self.standing_still() || self.current_power < INITIAL_POWER {
            self.increase(RAMP_STEP);
        }

        if let Some(direction) = transition.and_then(SectionType::code) {
            if !self.seen_first_transition {
                // the first boundary has no preceding section to time
                self.seen_first_transition = true;
            } else {
                self.transition_times.push(sensor.timestamp_ms);
                self.track.push(direction);
                self.map
                    .push(TrackSection::provisional(direction, self.current_power));
                debug!(track = %self.track, "section recorded");

                let lap = pattern::recognize(&self.track);
                if !lap.is_empty() {
                    self.lap = lap.to_string();
                    self.finalize_map();
                    self.tracker.reset();
                    self.phase = Phase::SafeSpeed;
                    info!(lap = %self.lap, sections = self.map.len(), "lap signature discovered");
                }
            }
        }

        if self.phase == Phase::Discovery {
            let started = *self
                .discovery_started_ms
                .get_or_insert(sensor.timestamp_ms);
            if sensor.timestamp_ms.saturating_sub(started) > self.config.discovery_timeout_ms {
                warn!(track = %self.track, "discovery did not converge, resetting state");
                self.reset();
                self.phase = Phase::Discovery;
                self.discovery_started_ms = Some(sensor.timestamp_ms);
            }
        }
    }

    /// Probe the power ceiling while the observed boundaries keep matching
    /// the lap signature. The first penalty ends probing; the next confirmed
    /// boundary switches to the per-section profiles.
    fn safe_speed(&mut self, sensor: &SensorEvent, transition: Option<SectionType>) {
        let Some(direction) = transition.and_then(SectionType::code) else {
            return;
        };

        if direction != self.expected_direction() {
            self.enter_lost(Phase::SafeSpeed, direction);
            return;
        }

        if self.probing {
            if self.standing_still() {
                self.increase(RAMP_STEP);
            } else if sensor.timestamp_ms > self.last_increase_ms + self.config.probe_interval_ms {
                self.last_increase_ms = sensor.timestamp_ms;
                self.increase(PROBE_STEP);
            }
            self.safe_power = self.safe_power.max(self.current_power);
        } else {
            self.build_profiles();
            self.phase = Phase::Optimize;
            info!(safe_power = self.safe_power, "probing over, driving per-section profiles");
        }
        self.tracker.advance(self.lap.len());
    }

    fn lost(&mut self, transition: Option<SectionType>) {
        if let Some(direction) = transition.and_then(SectionType::code) {
            self.lost_observe(direction);
        }
    }

    fn optimize(&mut self, sensor: &SensorEvent, transition: Option<SectionType>) {
        if let Some(window) = self.boost {
            if sensor.timestamp_ms >= window.deadline_ms {
                self.current_power = window.leaving_power;
                if !self.section_penalized {
                    self.upgrade_section(window.section);
                }
                self.boost = None;
            }
        }

        let Some(direction) = transition.and_then(SectionType::code) else {
            return;
        };

        if direction != self.expected_direction() {
            self.enter_lost(Phase::Optimize, direction);
            return;
        }

        let index = self.tracker.index();
        self.tracker.advance(self.lap.len());
        self.last_entered = Some(index);
        self.section_penalized = false;

        let section = &self.map[index];
        let entry = section.entry_power;
        let leaving = section.leaving_power;
        let window_ms = section.boost_window_ms;
        let boosted = section.direction == 'S' && window_ms > 0;

        self.current_power = entry;
        if boosted {
            self.boost = Some(BoostWindow {
                deadline_ms: sensor.timestamp_ms + window_ms,
                leaving_power: leaving,
                section: index,
            });
        }
        debug!(index, direction = %direction, power = self.current_power, "section boundary");
    }

    fn on_penalty(&mut self) -> PowerCommand {
        if self.current_power <= self.safe_power {
            self.current_power = (self.current_power - PENALTY_STEP).max(0.0);
            self.safe_power = self.current_power;
        } else {
            // penalty inside a boosted window: fall back to the confirmed
            // ceiling, the ceiling itself is not to blame
            self.current_power = self.safe_power;
        }
        self.probing = false;
        self.section_penalized = true;
        self.boost = None;

        if self.phase == Phase::Optimize {
            if let Some(index) = self.last_entered {
                self.downgrade_section(index);
            }
        }

        warn!(power = self.current_power, safe_power = self.safe_power, "penalty");
        PowerCommand::from_level(self.current_power)
    }

    fn enter_lost(&mut self, resume: Phase, direction: char) {
        info!(
            expected = %self.expected_direction(),
            observed = %direction,
            "observed section does not match the lap, position lost"
        );
        self.resume_phase = resume;
        self.phase = Phase::Lost;
        self.boost = None;
        self.current_power = self.current_power.min(self.safe_power);
        self.lost_observe(direction);
    }

    fn lost_observe(&mut self, direction: char) {
        match self.tracker.observe_lost(&self.lap, direction) {
            Resync::Recovered(index) => {
                info!(index, phase = ?self.resume_phase, "position resynchronized");
                self.phase = self.resume_phase;
            }
            Resync::Pending => {
                debug!(buffered = self.tracker.buffered(), "position still unknown");
            }
        }
    }

    fn build_profiles(&mut self) {
        for section in &mut self.map {
            if section.direction == 'S' {
                section.entry_power = (self.safe_power + STRAIGHT_BOOST).min(MAX_POWER);
                section.leaving_power = self.safe_power;
                section.boost_window_ms = section.duration_ms / 2;
            } else {
                section.entry_power = self.safe_power;
                section.leaving_power = self.safe_power;
                section.boost_window_ms = 0;
            }
            section.locked = false;
        }
    }

    fn upgrade_section(&mut self, index: usize) {
        let Some(section) = self.map.get_mut(index) else {
            return;
        };
        if section.locked || section.direction != 'S' {
            return;
        }
        section.entry_power = (section.entry_power + BOOST_UPGRADE_STEP).min(MAX_POWER);
        section.boost_window_ms =
            (section.boost_window_ms + section.duration_ms / 10).min(section.duration_ms);
        debug!(index, entry = section.entry_power, "section profile upgraded");
    }

    fn downgrade_section(&mut self, index: usize) {
        let Some(section) = self.map.get_mut(index) else {
            return;
        };
        section.entry_power = (section.entry_power - BOOST_DOWNGRADE_STEP).max(section.leaving_power);
        section.boost_window_ms = (section.boost_window_ms - section.duration_ms / 5).max(0);
        section.locked = true;
        info!(index, entry = section.entry_power, "section profile downgraded after penalty");
    }

    fn finalize_map(&mut self) {
        self.map.truncate(self.lap.len());
        for (i, section) in self.map.iter_mut().enumerate() {
            if let (Some(entered), Some(left)) =
                (self.transition_times.get(i), self.transition_times.get(i + 1))
            {
                section.duration_ms = left - entered;
            }
        }
    }

    fn expected_direction(&self) -> char {
        self.tracker.expected(&self.lap)
    }

    fn standing_still(&self) -> bool {
        self.smoother.dispersion() < STANDSTILL_DISPERSION
    }

    fn increase(&mut self, step: f64) {
        self.current_power = (self.current_power + step).min(MAX_POWER);
    }

    fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(timestamp_ms: i64, gyro_z: f64) -> StrategyEvent {
        StrategyEvent::Sensor(SensorEvent {
            timestamp_ms,
            gyro: [0.0, 0.0, gyro_z],
            accel: [0.0; 3],
        })
    }

    #[test]
    fn warmup_ramps_one_step_per_tick_while_standing_still() {
        let mut machine = StrategyStateMachine::new(StrategyConfig::default());
        for tick in 1..=150 {
            let command = machine
                .handle(sensor(tick * 20, 0.0))
                .expect("sensor events always yield a command");
            assert_eq!(command.value() as i64, tick.min(255));
            assert_eq!(machine.phase(), Phase::Warmup);
        }
    }

    #[test]
    fn warmup_hands_over_once_moving_at_launch_power() {
        let mut machine = StrategyStateMachine::new(StrategyConfig::default());
        let mut ts = 0;
        // noisy trace: the vehicle counts as moving from the start
        for tick in 0..200 {
            ts += 20;
            let jitter = if tick % 2 == 0 { 30.0 } else { -30.0 };
            machine.handle(sensor(ts, jitter));
            if machine.phase() != Phase::Warmup {
                break;
            }
        }
        assert_eq!(machine.phase(), Phase::Discovery);
        assert!(machine.current_power() >= INITIAL_POWER);
    }

    #[test]
    fn penalty_at_or_below_safe_power_ratchets_both_down() {
        let mut machine = StrategyStateMachine::new(StrategyConfig::default());
        for tick in 1..=50 {
            machine.handle(sensor(tick * 20, 0.0));
        }
        assert_eq!(machine.current_power(), 50.0);
        assert_eq!(machine.safe_power(), INITIAL_POWER);

        let command = machine.handle(StrategyEvent::Penalty).unwrap();
        assert_eq!(command.value(), 40);
        assert_eq!(machine.current_power(), 40.0);
        assert_eq!(machine.safe_power(), 40.0);
        assert!(!machine.is_probing());
    }

    #[test]
    fn repeated_penalties_never_push_power_below_zero() {
        let mut machine = StrategyStateMachine::new(StrategyConfig::default());
        for _ in 0..50 {
            let command = machine.handle(StrategyEvent::Penalty).unwrap();
            assert_eq!(command.value(), 0);
        }
        assert_eq!(machine.current_power(), 0.0);
        assert_eq!(machine.safe_power(), 0.0);
    }

    #[test]
    fn velocity_events_yield_no_command() {
        let mut machine = StrategyStateMachine::new(StrategyConfig::default());
        let event = StrategyEvent::Velocity(VelocityEvent {
            timestamp_ms: 1,
            velocity: 3.5,
        });
        assert!(machine.handle(event).is_none());
    }

    #[test]
    fn race_start_behaves_like_a_brand_new_machine() {
        let config = StrategyConfig::default();
        let mut fresh = StrategyStateMachine::new(config.clone());
        let mut reused = StrategyStateMachine::new(config);

        // drag the reused machine through some history first
        for tick in 1..=30 {
            reused.handle(sensor(tick * 20, if tick % 2 == 0 { 800.0 } else { -800.0 }));
        }
        reused.handle(StrategyEvent::Penalty);
        assert!(reused.handle(StrategyEvent::RaceStart).is_none());

        for tick in 1..=100 {
            let event = sensor(tick * 20, (tick % 3) as f64 * 100.0);
            let a = fresh.handle(event.clone());
            let b = reused.handle(event);
            assert_eq!(a, b);
        }
        assert_eq!(fresh.phase(), reused.phase());
        assert_eq!(fresh.current_power(), reused.current_power());
    }

    #[test]
    fn power_commands_stay_clamped() {
        let mut machine = StrategyStateMachine::new(StrategyConfig::default());
        for tick in 1..=500 {
            let command = machine.handle(sensor(tick * 20, 0.0)).unwrap();
            assert!(command.value() as f64 <= MAX_POWER);
        }
        assert_eq!(machine.current_power(), MAX_POWER);
    }

    #[test]
    fn from_level_clamps_both_ends() {
        assert_eq!(PowerCommand::from_level(-40.0).value(), 0);
        assert_eq!(PowerCommand::from_level(400.0).value(), 255);
        assert_eq!(PowerCommand::from_level(128.0).value(), 128);
    }
}
