use crate::net::{EntityState, InputState, PlayerId, Snapshot, Tick};
use crate::simulation::{TickClock, TickOverflow, apply_input};

use super::buffer::{BufferFull, DEFAULT_PENDING_CAPACITY, PendingInputBuffer};

/// The predictor cannot take another tick without losing replay history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PredictionError {
    #[error(transparent)]
    PendingFull(#[from] BufferFull),
    #[error(transparent)]
    TickOverflow(#[from] TickOverflow),
}

/// What the player wants to do this tick, before it is stamped with a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputIntent {
    pub forward: f32,
    pub right: f32,
    pub jump: bool,
    pub fire: bool,
    pub yaw: f32,
    pub pitch: f32,
}

impl InputIntent {
    pub fn to_input(&self, tick: Tick) -> InputState {
        InputState {
            tick,
            seq: tick,
            forward: self.forward,
            right: self.right,
            jump: self.jump,
            fire: self.fire,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    Applied {
        tick: Tick,
        replayed: usize,
        /// Distance between the prediction before and after reconciling.
        correction: f32,
    },
    /// Older than the latest snapshot already applied.
    Stale { tick: Tick, latest: Tick },
    /// Claims a tick this client has not simulated yet.
    Future { tick: Tick, current: Tick },
    NoLocalEntity { tick: Tick },
}

/// Client half of prediction and reconciliation.
///
/// Each tick the local input is applied immediately and remembered. When a
/// snapshot arrives, the predicted state is reset to the server's state at
/// that tick and every input the server has not seen yet is replayed on top.
#[derive(Debug)]
pub struct ClientPredictor {
    clock: TickClock,
    predicted: EntityState,
    pending: PendingInputBuffer,
    local_id: Option<PlayerId>,
    last_reconciled_tick: Option<Tick>,
    last_correction: f32,
    stale_snapshots: u64,
}

impl Default for ClientPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientPredictor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PENDING_CAPACITY)
    }

    pub fn with_capacity(max_pending: usize) -> Self {
        Self {
            clock: TickClock::new(),
            predicted: EntityState::default(),
            pending: PendingInputBuffer::new(max_pending),
            local_id: None,
            last_reconciled_tick: None,
            last_correction: 0.0,
            stale_snapshots: 0,
        }
    }

    /// Starts a new tick: stamps `intent`, applies it locally and buffers it.
    /// The returned input is what goes on the wire.
    ///
    /// Fails without touching any state when the pending buffer is full, since
    /// dropping an unacknowledged input would make every later replay wrong.
    pub fn predict(&mut self, intent: &InputIntent) -> Result<InputState, PredictionError> {
        if self.pending.is_full() {
            return Err(BufferFull {
                capacity: self.pending.capacity(),
            }
            .into());
        }

        let tick = self.clock.advance()?;
        let input = intent.to_input(tick);

        apply_input(&mut self.predicted, &input);
        self.pending.push(input)?;

        Ok(input)
    }

    pub fn reconcile(&mut self, snapshot: &Snapshot) -> ReconcileOutcome {
        let tick = snapshot.tick;

        if let Some(latest) = self.last_reconciled_tick {
            if tick < latest {
                self.stale_snapshots += 1;
                log::trace!("Ignoring stale snapshot {} (latest {})", tick, latest);
                return ReconcileOutcome::Stale { tick, latest };
            }
        }

        let current = self.clock.current();
        if tick > current {
            log::warn!(
                "Ignoring snapshot for tick {} ahead of local tick {}",
                tick,
                current
            );
            return ReconcileOutcome::Future { tick, current };
        }

        let entity = match self.local_id {
            Some(id) => snapshot.entity(id),
            None => snapshot.entities.first(),
        };
        let Some(&baseline) = entity else {
            log::debug!("Snapshot {} has no entity for the local player", tick);
            return ReconcileOutcome::NoLocalEntity { tick };
        };

        if self.local_id.is_none() {
            log::info!("Assigned player id {}", baseline.id);
            self.local_id = Some(baseline.id);
        }

        self.pending.acknowledge(tick);

        let mut state = baseline;
        for input in self.pending.iter() {
            apply_input(&mut state, input);
        }

        let correction = (state.pos - self.predicted.pos).length();
        if correction > 0.0 {
            log::debug!("Reconciled tick {} with correction {:.4}", tick, correction);
        }

        self.predicted = state;
        self.last_reconciled_tick = Some(tick);
        self.last_correction = correction;

        ReconcileOutcome::Applied {
            tick,
            replayed: self.pending.len(),
            correction,
        }
    }

    pub fn predicted(&self) -> &EntityState {
        &self.predicted
    }

    pub fn current_tick(&self) -> Tick {
        self.clock.current()
    }

    pub fn pending(&self) -> &PendingInputBuffer {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local_id
    }

    pub fn last_reconciled_tick(&self) -> Option<Tick> {
        self.last_reconciled_tick
    }

    pub fn last_correction(&self) -> f32 {
        self.last_correction
    }

    pub fn stale_snapshot_count(&self) -> u64 {
        self.stale_snapshots
    }

    pub fn reset(&mut self) {
        *self = Self::with_capacity(self.pending.capacity());
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    fn intent(forward: f32, right: f32) -> InputIntent {
        InputIntent {
            forward,
            right,
            ..Default::default()
        }
    }

    fn varied_intent(tick: u32) -> InputIntent {
        let phase = tick as f32 * 0.61;
        InputIntent {
            forward: phase.sin(),
            right: (phase * 0.5).cos(),
            yaw: phase,
            pitch: -0.2,
            ..Default::default()
        }
    }

    /// Server-side canonical state after applying `inputs`.
    fn authoritative(id: PlayerId, inputs: &[InputState]) -> EntityState {
        let mut state = EntityState::new(id);
        for input in inputs {
            apply_input(&mut state, input);
        }
        state
    }

    fn same_motion(a: &EntityState, b: &EntityState) -> bool {
        a.pos.to_array().map(f32::to_bits) == b.pos.to_array().map(f32::to_bits)
            && a.vel.to_array().map(f32::to_bits) == b.vel.to_array().map(f32::to_bits)
            && a.yaw.to_bits() == b.yaw.to_bits()
            && a.pitch.to_bits() == b.pitch.to_bits()
    }

    #[test]
    fn predict_stamps_consecutive_ticks() {
        let mut predictor = ClientPredictor::new();
        let first = predictor.predict(&intent(1.0, 0.0)).unwrap();
        let second = predictor.predict(&intent(1.0, 0.0)).unwrap();

        assert_eq!((first.tick, first.seq), (1, 1));
        assert_eq!((second.tick, second.seq), (2, 2));
        assert_eq!(predictor.pending().ticks(), vec![1, 2]);
    }

    #[test]
    fn basic_round_trip() {
        let mut predictor = ClientPredictor::new();
        let input = predictor.predict(&intent(1.0, 0.0)).unwrap();
        let server = authoritative(1, &[input]);
        assert_eq!(server.pos, Vec3::new(0.078125, 0.0, 0.0));

        let outcome = predictor.reconcile(&Snapshot::new(1).with_entity(server));
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                tick: 1,
                replayed: 0,
                correction: 0.0
            }
        );
        assert!(predictor.pending().is_empty());
        assert_eq!(predictor.local_id(), Some(1));
    }

    #[test]
    fn replay_matches_single_pass() {
        let mut one_pass = ClientPredictor::new();
        let mut replayed = ClientPredictor::new();
        let mut sent = Vec::new();

        for tick in 1..=120 {
            one_pass.predict(&varied_intent(tick)).unwrap();
            sent.push(replayed.predict(&varied_intent(tick)).unwrap());
        }

        for acked in [30usize, 31, 75, 119] {
            let server = authoritative(1, &sent[..acked]);
            replayed.reconcile(&Snapshot::new(acked as Tick).with_entity(server));
            assert!(same_motion(replayed.predicted(), one_pass.predicted()));
            assert_eq!(replayed.last_correction(), 0.0);
        }
    }

    #[test]
    fn reapplying_a_snapshot_is_idempotent() {
        let mut predictor = ClientPredictor::new();
        let sent: Vec<_> = (1..=10)
            .map(|tick| predictor.predict(&varied_intent(tick)).unwrap())
            .collect();

        let mut server = authoritative(1, &sent[..6]);
        server.pos += Vec3::new(0.5, 0.0, 0.0);
        let snapshot = Snapshot::new(6).with_entity(server);

        predictor.reconcile(&snapshot);
        let once = *predictor.predicted();
        let pending_once = predictor.pending().ticks();

        predictor.reconcile(&snapshot);
        assert!(same_motion(predictor.predicted(), &once));
        assert_eq!(predictor.pending().ticks(), pending_once);
    }

    #[test]
    fn no_pending_tick_at_or_below_snapshot() {
        let mut predictor = ClientPredictor::new();
        for tick in 1..=20 {
            predictor.predict(&varied_intent(tick)).unwrap();
        }

        for acked in [3, 9, 9, 15] {
            predictor.reconcile(&Snapshot::new(acked).with_entity(EntityState::new(1)));
            assert!(predictor.pending().iter().all(|input| input.tick > acked));
        }
        assert_eq!(predictor.pending().ticks(), vec![16, 17, 18, 19, 20]);
    }

    #[test]
    fn out_of_order_snapshot_is_ignored() {
        let mut predictor = ClientPredictor::new();
        for tick in 1..=12 {
            predictor.predict(&varied_intent(tick)).unwrap();
        }

        predictor.reconcile(&Snapshot::new(10).with_entity(EntityState::new(1)));
        let before = *predictor.predicted();
        let pending_before = predictor.pending().ticks();

        let late = EntityState {
            pos: Vec3::new(100.0, 0.0, 0.0),
            ..EntityState::new(1)
        };
        let outcome = predictor.reconcile(&Snapshot::new(7).with_entity(late));

        assert_eq!(outcome, ReconcileOutcome::Stale { tick: 7, latest: 10 });
        assert!(same_motion(predictor.predicted(), &before));
        assert_eq!(predictor.pending().ticks(), pending_before);
        assert_eq!(predictor.stale_snapshot_count(), 1);
    }

    #[test]
    fn replay_after_ack() {
        let mut predictor = ClientPredictor::new();
        let sent: Vec<_> = (1..=7)
            .map(|_| predictor.predict(&intent(1.0, 0.5)).unwrap())
            .collect();
        predictor.reconcile(&Snapshot::new(4).with_entity(authoritative(1, &sent[..4])));
        assert_eq!(predictor.pending().ticks(), vec![5, 6, 7]);

        let baseline = EntityState {
            pos: Vec3::new(1.0, 0.0, 0.0),
            ..EntityState::new(1)
        };
        predictor.reconcile(&Snapshot::new(6).with_entity(baseline));

        let mut expected = baseline;
        apply_input(&mut expected, &sent[6]);
        assert_eq!(predictor.pending().ticks(), vec![7]);
        assert!(same_motion(predictor.predicted(), &expected));
        assert!(predictor.last_correction() > 0.0);
    }

    #[test]
    fn future_snapshot_is_ignored() {
        let mut predictor = ClientPredictor::new();
        predictor.predict(&intent(1.0, 0.0)).unwrap();

        let outcome = predictor.reconcile(&Snapshot::new(5).with_entity(EntityState::new(1)));
        assert_eq!(outcome, ReconcileOutcome::Future { tick: 5, current: 1 });
        assert_eq!(predictor.pending_count(), 1);
        assert_eq!(predictor.last_reconciled_tick(), None);
    }

    #[test]
    fn other_players_are_ignored_once_id_is_known() {
        let mut predictor = ClientPredictor::new();
        for _ in 1..=3 {
            predictor.predict(&intent(1.0, 0.0)).unwrap();
        }

        predictor.reconcile(&Snapshot::new(1).with_entity(EntityState::new(4)));
        assert_eq!(predictor.local_id(), Some(4));

        let outcome = predictor.reconcile(&Snapshot::new(2).with_entity(EntityState::new(9)));
        assert_eq!(outcome, ReconcileOutcome::NoLocalEntity { tick: 2 });
        assert_eq!(predictor.last_reconciled_tick(), Some(1));
    }

    #[test]
    fn empty_snapshot_is_ignored() {
        let mut predictor = ClientPredictor::new();
        predictor.predict(&intent(1.0, 0.0)).unwrap();
        assert_eq!(
            predictor.reconcile(&Snapshot::new(1)),
            ReconcileOutcome::NoLocalEntity { tick: 1 }
        );
        assert_eq!(predictor.pending_count(), 1);
    }

    #[test]
    fn full_buffer_refuses_instead_of_dropping() {
        let mut predictor = ClientPredictor::with_capacity(4);
        let mut sent = Vec::new();
        for tick in 1..=4 {
            sent.push(predictor.predict(&varied_intent(tick)).unwrap());
        }

        let before = *predictor.predicted();
        assert_eq!(
            predictor.predict(&varied_intent(5)),
            Err(PredictionError::PendingFull(BufferFull { capacity: 4 }))
        );
        assert_eq!(predictor.current_tick(), 4);
        assert_eq!(predictor.pending().ticks(), vec![1, 2, 3, 4]);
        assert!(same_motion(predictor.predicted(), &before));

        predictor.reconcile(&Snapshot::new(1).with_entity(authoritative(1, &sent[..1])));
        sent.push(predictor.predict(&varied_intent(5)).unwrap());
        assert!(predictor.predict(&varied_intent(6)).is_err());

        predictor.reconcile(&Snapshot::new(3).with_entity(authoritative(1, &sent[..3])));
        for tick in 6..=7 {
            sent.push(predictor.predict(&varied_intent(tick)).unwrap());
        }
        predictor.reconcile(&Snapshot::new(3).with_entity(authoritative(1, &sent[..3])));

        assert_eq!(predictor.pending().ticks(), vec![4, 5, 6, 7]);
        assert!(same_motion(predictor.predicted(), &authoritative(1, &sent)));
    }

    #[test]
    fn reset_starts_over() {
        let mut predictor = ClientPredictor::with_capacity(8);
        predictor.predict(&intent(1.0, 0.0)).unwrap();
        predictor.reconcile(&Snapshot::new(1).with_entity(EntityState::new(2)));

        predictor.reset();
        assert_eq!(predictor.current_tick(), 0);
        assert_eq!(predictor.local_id(), None);
        assert_eq!(predictor.predicted().pos, Vec3::ZERO);
        assert_eq!(predictor.pending().capacity(), 8);
    }
}
