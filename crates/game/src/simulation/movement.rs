use glam::Vec3;

use super::tick::TICK_DT;
use crate::net::{EntityState, InputState};

pub const PLAYER_SPEED: f32 = 5.0;

/// Advances `entity` by one tick of `input`.
///
/// Prediction, replay and the server all call this, so it must stay a pure
/// function of its arguments. `forward` moves along +X and `right` along +Z.
pub fn apply_input(entity: &mut EntityState, input: &InputState) {
    let forward = sanitize_axis(input.forward);
    let right = sanitize_axis(input.right);

    entity.vel = Vec3::new(forward * PLAYER_SPEED, 0.0, right * PLAYER_SPEED);
    entity.pos += entity.vel * TICK_DT;

    entity.yaw = finite_or_zero(input.yaw);
    entity.pitch = finite_or_zero(input.pitch).clamp(
        -std::f32::consts::FRAC_PI_2,
        std::f32::consts::FRAC_PI_2,
    );
}

fn sanitize_axis(value: f32) -> f32 {
    finite_or_zero(value).clamp(-1.0, 1.0)
}

fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_moves_along_x() {
        let mut entity = EntityState::new(1);
        apply_input(&mut entity, &InputState::new(1).with_movement(1.0, 0.0));

        assert_eq!(entity.pos, Vec3::new(0.078125, 0.0, 0.0));
        assert_eq!(entity.vel, Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn right_moves_along_z() {
        let mut entity = EntityState::new(1);
        apply_input(&mut entity, &InputState::new(1).with_movement(0.0, -1.0));
        assert_eq!(entity.pos, Vec3::new(0.0, 0.0, -0.078125));
    }

    #[test]
    fn axes_are_clamped() {
        let mut clamped = EntityState::new(1);
        let mut unit = EntityState::new(1);
        apply_input(&mut clamped, &InputState::new(1).with_movement(4.0, -9.0));
        apply_input(&mut unit, &InputState::new(1).with_movement(1.0, -1.0));
        assert_eq!(clamped, unit);
    }

    #[test]
    fn non_finite_input_is_ignored() {
        let mut entity = EntityState::new(1);
        let mut input = InputState::new(1).with_movement(f32::NAN, f32::INFINITY);
        input.yaw = f32::NAN;
        apply_input(&mut entity, &input);

        assert_eq!(entity.pos, Vec3::ZERO);
        assert_eq!(entity.yaw, 0.0);
    }

    #[test]
    fn view_angles_follow_input() {
        let mut entity = EntityState::new(1);
        let mut input = InputState::new(1);
        input.yaw = 1.5;
        input.pitch = 3.0;
        apply_input(&mut entity, &input);

        assert_eq!(entity.yaw, 1.5);
        assert_eq!(entity.pitch, std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn identical_inputs_give_identical_states() {
        let inputs: Vec<InputState> = (1..=200)
            .map(|tick| {
                let phase = tick as f32 * 0.37;
                InputState::new(tick).with_movement(phase.sin(), phase.cos())
            })
            .collect();

        let mut a = EntityState::new(1);
        let mut b = EntityState::new(1);
        for input in &inputs {
            apply_input(&mut a, input);
        }
        for input in &inputs {
            apply_input(&mut b, input);
        }
        assert_eq!(a.pos.x.to_bits(), b.pos.x.to_bits());
        assert_eq!(a.pos.z.to_bits(), b.pos.z.to_bits());
    }
}
