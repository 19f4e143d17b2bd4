//! Violation aggregation state machine
//!
//! Converts a dense per-frame observation stream into sparse, debounced
//! intervals. One aggregator instance covers exactly one chunk's frame
//! stream; state is not carried across chunk boundaries, so a violation
//! spanning a chunk seam surfaces as two shorter events.
//!
//! Per event type, independently:
//! - condition true, no active interval: open one at `t`
//! - condition true, active interval: extend to `t`, keep max confidence
//! - condition false, active interval: close at `t`
//! - condition false, no active interval: no-op
//!
//! At end of stream every still-active interval is force-closed at its
//! last observed timestamp. Only intervals at least as long as the
//! debounce threshold become events; shorter flickers are discarded.

use std::collections::HashMap;

use uuid::Uuid;

use super::{FrameObservations, IdentityCheck};
use crate::analysis::messages;
use crate::models::{ViolationEvent, ViolationKind};

/// An interval currently believed to still be in progress
#[derive(Debug, Clone, Copy)]
struct ActiveInterval {
    start_seconds: f64,
    end_seconds: f64,
    confidence: f64,
}

/// A finished interval, chunk-relative, not yet debounce-filtered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedInterval {
    pub kind: ViolationKind,
    pub start_seconds: f64,
    pub end_seconds: f64,
    /// Maximum confidence observed while the condition held
    pub confidence: f64,
}

impl ClosedInterval {
    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// Convert to a persistable event with session-absolute times
    pub fn into_event(
        self,
        session_id: Uuid,
        source_chunk_index: i64,
        chunk_start_seconds: f64,
    ) -> ViolationEvent {
        let start_seconds = (chunk_start_seconds + self.start_seconds) as i64;
        let end_seconds = (chunk_start_seconds + self.end_seconds) as i64;

        ViolationEvent {
            session_id,
            kind: self.kind,
            message: messages::message_for(self.kind.as_str()).to_string(),
            start_seconds,
            end_seconds,
            duration_seconds: self.duration() as i64,
            confidence: self.confidence,
            source_chunk_index,
            seek_seconds: start_seconds,
        }
    }
}

/// Per-signal-type debounce state machine for one chunk's frame stream
pub struct ViolationAggregator {
    debounce_seconds: f64,
    active: HashMap<ViolationKind, ActiveInterval>,
    closed: Vec<ClosedInterval>,
}

impl ViolationAggregator {
    pub fn new(debounce_seconds: f64) -> Self {
        Self {
            debounce_seconds,
            active: HashMap::new(),
            closed: Vec::new(),
        }
    }

    /// Apply one observation for one event type at time `t`
    pub fn observe(&mut self, kind: ViolationKind, condition: bool, t: f64, confidence: f64) {
        if condition {
            match self.active.get_mut(&kind) {
                Some(interval) => {
                    interval.end_seconds = t;
                    interval.confidence = interval.confidence.max(confidence);
                }
                None => {
                    self.active.insert(
                        kind,
                        ActiveInterval {
                            start_seconds: t,
                            end_seconds: t,
                            confidence,
                        },
                    );
                }
            }
        } else if let Some(interval) = self.active.remove(&kind) {
            self.closed.push(ClosedInterval {
                kind,
                start_seconds: interval.start_seconds,
                end_seconds: t,
                confidence: interval.confidence,
            });
        }
    }

    /// Apply the full observation set for one sampled frame
    ///
    /// Observation-to-condition mapping and the fixed confidences follow
    /// the detector contract: face counting 0.9/0.95, gaze 0.8, object
    /// classes carry their own per-detection confidences.
    pub fn observe_frame(&mut self, frame: &FrameObservations) {
        let t = frame.timestamp_seconds;

        // Identity is only evaluated when the verifier produced a verdict;
        // inconclusive frames leave any active mismatch interval untouched
        match frame.identity {
            Some(IdentityCheck::Mismatch) => {
                self.observe(ViolationKind::IdentityMismatch, true, t, 0.9)
            }
            Some(IdentityCheck::Match) => {
                self.observe(ViolationKind::IdentityMismatch, false, t, 0.9)
            }
            Some(IdentityCheck::Inconclusive) | None => {}
        }

        self.observe(ViolationKind::NoFace, frame.face_count == 0, t, 0.9);
        self.observe(ViolationKind::MultiplePeople, frame.face_count > 1, t, 0.95);
        self.observe(ViolationKind::LookingAway, frame.looking_away, t, 0.8);

        let phone_confidence = max_confidence(&frame.phone_confidences);
        self.observe(
            ViolationKind::PhoneUsage,
            !frame.phone_confidences.is_empty(),
            t,
            phone_confidence,
        );

        let object_confidence = max_confidence(&frame.object_confidences);
        self.observe(
            ViolationKind::SuspectedObject,
            !frame.object_confidences.is_empty(),
            t,
            object_confidence,
        );
    }

    /// End of the frame stream: force-close remaining intervals and apply
    /// the debounce filter
    pub fn finish(mut self) -> Vec<ClosedInterval> {
        for (kind, interval) in self.active.drain() {
            self.closed.push(ClosedInterval {
                kind,
                start_seconds: interval.start_seconds,
                end_seconds: interval.end_seconds,
                confidence: interval.confidence,
            });
        }

        let debounce = self.debounce_seconds;
        let mut intervals: Vec<ClosedInterval> = self
            .closed
            .into_iter()
            .filter(|interval| interval.duration() >= debounce)
            .collect();

        intervals.sort_by(|a, b| {
            a.start_seconds
                .partial_cmp(&b.start_seconds)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        intervals
    }
}

fn max_confidence(confidences: &[f64]) -> f64 {
    confidences.iter().copied().fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_frame(t: f64) -> FrameObservations {
        FrameObservations {
            timestamp_seconds: t,
            face_count: 1,
            looking_away: false,
            phone_confidences: Vec::new(),
            object_confidences: Vec::new(),
            identity: None,
        }
    }

    #[test]
    fn condition_shorter_than_debounce_is_suppressed() {
        let mut aggregator = ViolationAggregator::new(2.0);
        for t in [0.0, 1.0] {
            aggregator.observe(ViolationKind::NoFace, true, t, 0.9);
        }

        // Stream ends here: [0,1] is force-closed, length 1 < 2
        assert!(aggregator.finish().is_empty());
    }

    #[test]
    fn condition_meeting_debounce_emits_one_event() {
        let mut aggregator = ViolationAggregator::new(2.0);
        for t in [0.0, 1.0, 2.0, 3.0] {
            aggregator.observe(ViolationKind::NoFace, true, t, 0.9);
        }

        let intervals = aggregator.finish();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start_seconds, 0.0);
        assert_eq!(intervals[0].end_seconds, 3.0);
    }

    #[test]
    fn clearing_condition_closes_at_the_clearing_frame() {
        let mut aggregator = ViolationAggregator::new(2.0);
        aggregator.observe(ViolationKind::LookingAway, true, 0.0, 0.8);
        aggregator.observe(ViolationKind::LookingAway, true, 1.0, 0.8);
        aggregator.observe(ViolationKind::LookingAway, false, 3.0, 0.8);

        let intervals = aggregator.finish();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].end_seconds, 3.0);
    }

    #[test]
    fn intervals_never_overlap_and_start_in_order() {
        let mut aggregator = ViolationAggregator::new(2.0);
        // Two separate episodes of the same type
        for t in [0.0, 1.0, 2.0] {
            aggregator.observe(ViolationKind::NoFace, true, t, 0.9);
        }
        aggregator.observe(ViolationKind::NoFace, false, 3.0, 0.9);
        for t in [10.0, 11.0, 12.0] {
            aggregator.observe(ViolationKind::NoFace, true, t, 0.9);
        }

        let intervals = aggregator.finish();
        assert_eq!(intervals.len(), 2);
        assert!(intervals[0].start_seconds <= intervals[1].start_seconds);
        assert!(intervals[0].end_seconds <= intervals[1].start_seconds);
    }

    #[test]
    fn confidence_is_the_maximum_observed() {
        let mut aggregator = ViolationAggregator::new(2.0);
        aggregator.observe(ViolationKind::PhoneUsage, true, 0.0, 0.4);
        aggregator.observe(ViolationKind::PhoneUsage, true, 1.0, 0.9);
        aggregator.observe(ViolationKind::PhoneUsage, true, 2.0, 0.6);

        let intervals = aggregator.finish();
        assert_eq!(intervals[0].confidence, 0.9);
    }

    #[test]
    fn event_types_aggregate_independently() {
        let mut aggregator = ViolationAggregator::new(2.0);
        for t in [0.0, 1.0, 2.0] {
            aggregator.observe(ViolationKind::NoFace, true, t, 0.9);
            aggregator.observe(ViolationKind::LookingAway, true, t, 0.8);
        }
        aggregator.observe(ViolationKind::NoFace, false, 3.0, 0.9);
        aggregator.observe(ViolationKind::LookingAway, true, 3.0, 0.8);

        let intervals = aggregator.finish();
        assert_eq!(intervals.len(), 2);
        let kinds: Vec<_> = intervals.iter().map(|i| i.kind).collect();
        assert!(kinds.contains(&ViolationKind::NoFace));
        assert!(kinds.contains(&ViolationKind::LookingAway));
    }

    #[test]
    fn inconclusive_identity_never_becomes_a_mismatch() {
        let mut aggregator = ViolationAggregator::new(2.0);
        for t in 0..10 {
            let mut frame = quiet_frame(t as f64);
            frame.identity = Some(IdentityCheck::Inconclusive);
            aggregator.observe_frame(&frame);
        }

        let intervals = aggregator.finish();
        assert!(!intervals
            .iter()
            .any(|i| i.kind == ViolationKind::IdentityMismatch));
    }

    #[test]
    fn inconclusive_identity_does_not_close_an_active_mismatch() {
        let mut aggregator = ViolationAggregator::new(2.0);
        for (t, identity) in [
            (0.0, IdentityCheck::Mismatch),
            (1.0, IdentityCheck::Inconclusive),
            (2.0, IdentityCheck::Mismatch),
        ] {
            let mut frame = quiet_frame(t);
            frame.identity = Some(identity);
            aggregator.observe_frame(&frame);
        }

        let intervals = aggregator.finish();
        let mismatches: Vec<_> = intervals
            .iter()
            .filter(|i| i.kind == ViolationKind::IdentityMismatch)
            .collect();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].start_seconds, 0.0);
        assert_eq!(mismatches[0].end_seconds, 2.0);
    }

    #[test]
    fn frame_mapping_covers_all_signals() {
        let mut aggregator = ViolationAggregator::new(2.0);
        for t in 0..4 {
            let frame = FrameObservations {
                timestamp_seconds: t as f64,
                face_count: 2,
                looking_away: true,
                phone_confidences: vec![0.7],
                object_confidences: vec![0.5, 0.8],
                identity: Some(IdentityCheck::Mismatch),
            };
            aggregator.observe_frame(&frame);
        }

        let intervals = aggregator.finish();
        let kinds: Vec<_> = intervals.iter().map(|i| i.kind).collect();
        assert!(kinds.contains(&ViolationKind::MultiplePeople));
        assert!(kinds.contains(&ViolationKind::LookingAway));
        assert!(kinds.contains(&ViolationKind::PhoneUsage));
        assert!(kinds.contains(&ViolationKind::SuspectedObject));
        assert!(kinds.contains(&ViolationKind::IdentityMismatch));
        // One visible face: never NO_FACE
        assert!(!kinds.contains(&ViolationKind::NoFace));
    }

    #[test]
    fn object_confidence_uses_the_strongest_detection() {
        let mut aggregator = ViolationAggregator::new(2.0);
        for t in 0..3 {
            let mut frame = quiet_frame(t as f64);
            frame.object_confidences = vec![0.3, 0.85, 0.6];
            aggregator.observe_frame(&frame);
        }

        let intervals = aggregator.finish();
        let object = intervals
            .iter()
            .find(|i| i.kind == ViolationKind::SuspectedObject)
            .unwrap();
        assert_eq!(object.confidence, 0.85);
    }

    #[test]
    fn into_event_shifts_to_session_absolute_time() {
        let interval = ClosedInterval {
            kind: ViolationKind::NoFace,
            start_seconds: 3.0,
            end_seconds: 7.0,
            confidence: 0.9,
        };

        let session_id = Uuid::new_v4();
        let event = interval.into_event(session_id, 2, 40.0);

        assert_eq!(event.start_seconds, 43);
        assert_eq!(event.end_seconds, 47);
        assert_eq!(event.duration_seconds, 4);
        assert_eq!(event.seek_seconds, 43);
        assert_eq!(event.source_chunk_index, 2);
        assert_eq!(event.message, "Candidate not visible on camera");
    }
}
