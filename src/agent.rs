//! Agent structure and behavior.
//!
//! An [`Agent`] bundles everything one genome needs during a generation: its
//! pose and locomotion state, the controller built from the genome, and a
//! mutable borrow of the genome itself so fitness is written in place.

use crate::config::{AgentConfig, NeatConfig, WorldConfig};
use crate::geometry::Rect;
use crate::neural::{FeedForwardNetwork, Genome, GenomeId};
use crate::obstacle::Obstacle;
use serde::{Deserialize, Serialize};

/// Length of the sense vector fed to every controller
pub const SENSE_INPUTS: usize = 6;

/// Controller outputs above this value count as "on"
pub const ACTION_THRESHOLD: f64 = 0.5;

/// Locomotion state; exactly one is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locomotion {
    Running,
    Jumping,
    Crouching,
}

/// Decoded controller output for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Action {
    pub jump: bool,
    pub crouch: bool,
}

impl Action {
    /// Threshold the raw controller outputs. Missing outputs read as "off".
    pub fn from_outputs(outputs: &[f64]) -> Self {
        let on = |i: usize| outputs.get(i).is_some_and(|&v| v > ACTION_THRESHOLD);
        Self {
            jump: on(0),
            crouch: on(1),
        }
    }
}

/// Maps a sense vector to an action vector
pub trait Controller {
    fn decide(&mut self, senses: &[f64]) -> Vec<f64>;
}

impl<F> Controller for F
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    fn decide(&mut self, senses: &[f64]) -> Vec<f64> {
        self(senses)
    }
}

/// Controller that never jumps or crouches
#[derive(Debug, Clone, Copy, Default)]
pub struct NullController;

impl Controller for NullController {
    fn decide(&mut self, _senses: &[f64]) -> Vec<f64> {
        vec![0.0, 0.0]
    }
}

/// Builds a controller from a genome
pub trait ControllerFactory {
    fn build(&self, genome: &Genome) -> Box<dyn Controller>;
}

impl ControllerFactory for NeatConfig {
    fn build(&self, genome: &Genome) -> Box<dyn Controller> {
        Box::new(FeedForwardNetwork::create(genome, self))
    }
}

impl<F> ControllerFactory for F
where
    F: Fn(&Genome) -> Box<dyn Controller>,
{
    fn build(&self, genome: &Genome) -> Box<dyn Controller> {
        self(genome)
    }
}

/// One evolvable runner in the shared world
pub struct Agent<'g> {
    pub genome_id: GenomeId,
    pub rect: Rect,
    pub state: Locomotion,
    /// Vertical velocity; positive is upwards
    pub velocity: f32,
    /// Ticks spent in the current crouch
    pub crouch_timer: u32,
    /// Remaining invulnerable collision passes, if any
    pub grace: Option<u32>,
    pub hit_points: u32,
    /// Debug-draw color, stable per genome id
    pub color: [u8; 3],

    body: AgentConfig,
    lane_x: f32,
    ground_y: f32,
    genome: &'g mut Genome,
    controller: Box<dyn Controller>,
}

impl<'g> Agent<'g> {
    /// Create a running agent at the lane start. The genome's fitness is reset
    /// to 0 so every genome has a value even if it dies on the first tick.
    pub fn new(
        genome: &'g mut Genome,
        controller: Box<dyn Controller>,
        body: &AgentConfig,
        world: &WorldConfig,
    ) -> Self {
        genome.fitness = Some(0.0);
        let genome_id = genome.key;

        Self {
            genome_id,
            rect: Rect::new(world.lane_x, world.ground_y, body.stand_width, body.stand_height),
            state: Locomotion::Running,
            velocity: body.jump_impulse,
            crouch_timer: 0,
            grace: None,
            hit_points: body.hit_points,
            color: color_for(genome_id),
            body: body.clone(),
            lane_x: world.lane_x,
            ground_y: world.ground_y,
            genome,
            controller,
        }
    }

    pub fn is_invulnerable(&self) -> bool {
        self.grace.is_some()
    }

    pub fn is_alive(&self) -> bool {
        self.hit_points > 0
    }

    pub fn is_grounded(&self) -> bool {
        self.state != Locomotion::Jumping
    }

    pub fn fitness(&self) -> f64 {
        self.genome.fitness.unwrap_or(0.0)
    }

    pub fn genome(&self) -> &Genome {
        self.genome
    }

    /// Add `delta` (possibly negative) to the bound genome's fitness
    pub fn reward(&mut self, delta: f64) {
        *self.genome.fitness.get_or_insert(0.0) += delta;
    }

    /// Arm invulnerability for `ticks` collision passes. Re-arming while a
    /// window is already active leaves the running countdown untouched.
    pub fn arm_grace(&mut self, ticks: u32) {
        if self.grace.is_none() {
            self.grace = Some(ticks);
        }
    }

    /// Apply one collision: penalty, hit point loss and grace window.
    /// Returns true when the agent is now dead.
    pub fn hit(&mut self, penalty: f64, grace_ticks: u32) -> bool {
        self.reward(-penalty);
        self.hit_points = self.hit_points.saturating_sub(1);
        self.arm_grace(grace_ticks);
        !self.is_alive()
    }

    /// Per-tick update: grace countdown first, then one locomotion step
    pub fn update(&mut self) {
        self.grace = match self.grace {
            Some(0) | None => None,
            Some(n) => Some(n - 1),
        };

        match self.state {
            Locomotion::Running => self.stand(),
            Locomotion::Jumping => {
                self.rect.y -= self.velocity * self.body.jump_scale;
                self.velocity -= self.body.gravity;
                if self.velocity <= -self.body.jump_impulse {
                    self.state = Locomotion::Running;
                    self.velocity = self.body.jump_impulse;
                    self.stand();
                }
            }
            Locomotion::Crouching => {
                self.crouch_pose();
                self.crouch_timer += 1;
                if self.crouch_timer >= self.body.crouch_frames {
                    self.state = Locomotion::Running;
                    self.crouch_timer = 0;
                    self.stand();
                }
            }
        }
    }

    /// Build the fixed-order sense vector against the nearest obstacle
    pub fn sense(&self, nearest: &Obstacle, speed: f32) -> [f64; SENSE_INPUTS] {
        [
            self.rect.y as f64,
            (nearest.rect.x - self.rect.x) as f64,
            nearest.rect.height as f64,
            nearest.rect.width as f64,
            speed as f64,
            nearest.rect.y as f64,
        ]
    }

    /// Query the controller and apply its decision
    pub fn think(&mut self, nearest: &Obstacle, speed: f32) -> Action {
        let senses = self.sense(nearest, speed);
        let outputs = self.controller.decide(&senses);
        let action = Action::from_outputs(&outputs);
        self.apply(action);
        action
    }

    /// Apply a decoded action. Jumping wins over crouching; a crouch is held
    /// only while the controller keeps asking for it.
    pub fn apply(&mut self, action: Action) {
        if action.jump && self.state == Locomotion::Running {
            self.state = Locomotion::Jumping;
            self.velocity = self.body.jump_impulse;
        }

        if action.crouch && self.state != Locomotion::Jumping {
            if self.state == Locomotion::Running {
                self.state = Locomotion::Crouching;
                self.crouch_timer = 0;
            }
            self.crouch_pose();
        } else if self.state == Locomotion::Crouching {
            self.state = Locomotion::Running;
            self.crouch_timer = 0;
            self.stand();
        }
    }

    fn stand(&mut self) {
        self.rect = Rect::new(
            self.lane_x,
            self.ground_y,
            self.body.stand_width,
            self.body.stand_height,
        );
    }

    fn crouch_pose(&mut self) {
        self.rect = Rect::new(
            self.lane_x,
            self.ground_y + self.body.stand_height - self.body.crouch_height,
            self.body.stand_width,
            self.body.crouch_height,
        );
    }
}

impl std::fmt::Debug for Agent<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("genome_id", &self.genome_id)
            .field("rect", &self.rect)
            .field("state", &self.state)
            .field("velocity", &self.velocity)
            .field("grace", &self.grace)
            .field("hit_points", &self.hit_points)
            .field("fitness", &self.genome.fitness)
            .finish()
    }
}

/// Deterministic color from a genome id (splitmix64 finalizer)
fn color_for(id: GenomeId) -> [u8; 3] {
    let mut z = id.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    [z as u8, (z >> 8) as u8, (z >> 16) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obstacle::ObstacleKind;

    fn make_agent(genome: &mut Genome) -> Agent<'_> {
        Agent::new(
            genome,
            Box::new(NullController),
            &AgentConfig::default(),
            &WorldConfig::default(),
        )
    }

    fn states(agent: &Agent) -> usize {
        [
            agent.state == Locomotion::Running,
            agent.state == Locomotion::Jumping,
            agent.state == Locomotion::Crouching,
        ]
        .iter()
        .filter(|&&b| b)
        .count()
    }

    #[test]
    fn test_new_agent_has_zero_fitness() {
        let mut genome = Genome::empty(7);
        genome.fitness = Some(42.0);
        let agent = make_agent(&mut genome);
        assert_eq!(agent.fitness(), 0.0);
        assert_eq!(agent.state, Locomotion::Running);
        assert_eq!(agent.rect, Rect::new(80.0, 310.0, 87.0, 94.0));
    }

    #[test]
    fn test_jump_arc_lands_exactly() {
        let mut genome = Genome::empty(1);
        let mut agent = make_agent(&mut genome);

        agent.apply(Action { jump: true, crouch: false });
        assert_eq!(agent.state, Locomotion::Jumping);

        let mut ticks = 0;
        let mut peak = agent.rect.y;
        while agent.state == Locomotion::Jumping {
            agent.update();
            peak = peak.min(agent.rect.y);
            ticks += 1;
            assert_eq!(states(&agent), 1);
            assert!(ticks < 100);
        }

        // 8.5 - 0.8 * k <= -8.5 first holds at k = 22
        assert_eq!(ticks, 22);
        assert!(peak < 310.0);
        assert_eq!(agent.rect.y, 310.0);
        assert_eq!(agent.velocity, 8.5);
    }

    #[test]
    fn test_cannot_crouch_or_rejump_while_airborne() {
        let mut genome = Genome::empty(1);
        let mut agent = make_agent(&mut genome);

        agent.apply(Action { jump: true, crouch: true });
        assert_eq!(agent.state, Locomotion::Jumping);
        assert_eq!(agent.rect.height, 94.0);

        agent.update();
        let v = agent.velocity;
        agent.apply(Action { jump: true, crouch: true });
        assert_eq!(agent.state, Locomotion::Jumping);
        assert_eq!(agent.velocity, v);
    }

    #[test]
    fn test_crouch_shrinks_and_times_out() {
        let config = AgentConfig::default();
        let mut genome = Genome::empty(1);
        let mut agent = make_agent(&mut genome);

        agent.apply(Action { jump: false, crouch: true });
        assert_eq!(agent.state, Locomotion::Crouching);
        assert_eq!(agent.rect.height, config.crouch_height);
        assert_eq!(agent.rect.width, config.stand_width);
        assert_eq!(agent.rect.bottom(), 310.0 + config.stand_height);

        for _ in 0..config.crouch_frames - 1 {
            agent.update();
            agent.apply(Action { jump: false, crouch: true });
            assert_eq!(agent.state, Locomotion::Crouching);
        }
        agent.update();
        assert_eq!(agent.state, Locomotion::Running);
        assert_eq!(agent.rect.height, config.stand_height);
    }

    #[test]
    fn test_crouch_cancelled_without_signal() {
        let mut genome = Genome::empty(1);
        let mut agent = make_agent(&mut genome);

        agent.apply(Action { jump: false, crouch: true });
        agent.update();
        agent.apply(Action::default());
        assert_eq!(agent.state, Locomotion::Running);
        assert_eq!(agent.rect.y, 310.0);
    }

    #[test]
    fn test_crouching_agent_cannot_jump() {
        let mut genome = Genome::empty(1);
        let mut agent = make_agent(&mut genome);

        agent.apply(Action { jump: false, crouch: true });
        agent.apply(Action { jump: true, crouch: false });
        // Crouch was released, but the jump needed a running start
        assert_eq!(agent.state, Locomotion::Running);
    }

    #[test]
    fn test_grace_blocks_exactly_window() {
        let mut genome = Genome::empty(1);
        let mut agent = make_agent(&mut genome);

        agent.arm_grace(30);
        let mut blocked = 0;
        for _ in 0..100 {
            agent.update();
            if agent.is_invulnerable() {
                blocked += 1;
            }
        }
        assert_eq!(blocked, 30);
        assert!(!agent.is_invulnerable());
    }

    #[test]
    fn test_rearm_during_grace_is_noop() {
        let mut genome = Genome::empty(1);
        let mut agent = make_agent(&mut genome);

        agent.arm_grace(30);
        for _ in 0..10 {
            agent.update();
        }
        assert_eq!(agent.grace, Some(20));
        agent.arm_grace(30);
        assert_eq!(agent.grace, Some(20));
    }

    #[test]
    fn test_hit_is_lethal_and_penalized() {
        let mut genome = Genome::empty(1);
        let mut agent = make_agent(&mut genome);
        agent.reward(1.5);

        assert!(agent.hit(5.0, 30));
        assert_eq!(agent.fitness(), -3.5);
        assert!(agent.is_invulnerable());
        assert!(!agent.is_alive());
    }

    #[test]
    fn test_sense_vector_order() {
        let mut genome = Genome::empty(1);
        let agent = make_agent(&mut genome);
        let obstacle = Obstacle::new(ObstacleKind::GroundLow, 0, Rect::new(500.0, 325.0, 40.0, 71.0));

        let senses = agent.sense(&obstacle, 21.0);
        assert_eq!(senses, [310.0, 420.0, 71.0, 40.0, 21.0, 325.0]);
    }

    #[test]
    fn test_closure_controller() {
        let mut genome = Genome::empty(1);
        let mut agent = Agent::new(
            &mut genome,
            Box::new(|_: &[f64]| vec![0.9, 0.1]),
            &AgentConfig::default(),
            &WorldConfig::default(),
        );
        let obstacle = Obstacle::new(ObstacleKind::FlyingHigh, 0, Rect::new(900.0, 150.0, 97.0, 68.0));

        let action = agent.think(&obstacle, 20.0);
        assert_eq!(action, Action { jump: true, crouch: false });
        assert_eq!(agent.state, Locomotion::Jumping);
    }

    #[test]
    fn test_colors_are_stable() {
        assert_eq!(color_for(12), color_for(12));
        assert_ne!(color_for(12), color_for(13));
    }
}
