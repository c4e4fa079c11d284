use trueshot::{InputIntent, Tick};

/// Supplies the player's intent for each predicted tick.
pub trait InputSource {
    fn sample(&mut self, tick: Tick) -> InputIntent;
}

impl<F> InputSource for F
where
    F: FnMut(Tick) -> InputIntent,
{
    fn sample(&mut self, tick: Tick) -> InputIntent {
        self(tick)
    }
}

/// Holds the same intent every tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantInput {
    intent: InputIntent,
}

impl ConstantInput {
    pub fn new(intent: InputIntent) -> Self {
        Self { intent }
    }

    pub fn movement(forward: f32, right: f32) -> Self {
        Self::new(InputIntent {
            forward,
            right,
            ..Default::default()
        })
    }
}

impl InputSource for ConstantInput {
    fn sample(&mut self, _tick: Tick) -> InputIntent {
        self.intent
    }
}
