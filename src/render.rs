//! Drawing through a pluggable canvas, plus real-time frame pacing.
//!
//! The simulation never depends on a draw call succeeding: [`draw_frame`]
//! reports failures to the caller, which logs them and keeps simulating.

use crate::agent::{Agent, Locomotion};
use crate::geometry::Rect;
use crate::obstacle::ObstacleKind;
use crate::world::World;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// RGB color
pub type Color = [u8; 3];

pub const WHITE: Color = [255, 255, 255];
pub const BLACK: Color = [0, 0, 0];
pub const RED: Color = [255, 0, 0];
pub const GREEN: Color = [0, 255, 0];

/// Sprite handles understood by a canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sprite {
    Running,
    Crouching,
    Jumping,
    Obstacle { kind: ObstacleKind, variant: usize },
    Track,
}

/// Drawing failure reported by a canvas
#[derive(Debug)]
pub struct RenderError(pub String);

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "render error: {}", self.0)
    }
}

impl std::error::Error for RenderError {}

pub type DrawResult = Result<(), RenderError>;

/// Draw surface supplied by a windowing backend
pub trait Canvas {
    fn clear(&mut self, color: Color) -> DrawResult;
    fn blit(&mut self, sprite: Sprite, x: f32, y: f32) -> DrawResult;
    /// Rectangle outline of the given thickness
    fn rect(&mut self, rect: Rect, color: Color, thickness: u32) -> DrawResult;
    fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Color, thickness: u32) -> DrawResult;
    fn text(&mut self, text: &str, x: f32, y: f32, color: Color) -> DrawResult;
    /// Flip the finished frame to the screen
    fn present(&mut self) -> DrawResult {
        Ok(())
    }
}

/// Text shown in the corner of every frame
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    pub generation: u32,
    pub alive: usize,
}

/// Draw one complete frame
pub fn draw_frame(canvas: &mut dyn Canvas, world: &World<'_>, overlay: &Overlay) -> DrawResult {
    let state = &world.state;
    let config = world.config();

    canvas.clear(WHITE)?;

    // Background track, drawn twice for a seamless scroll
    let track_y = config.world.ground_y + config.agent.stand_height;
    canvas.blit(Sprite::Track, state.background_x, track_y)?;
    canvas.blit(Sprite::Track, state.background_x + config.world.field_width, track_y)?;

    for agent in &world.agents {
        draw_agent(canvas, agent, world)?;
    }

    for obstacle in state.obstacles.iter() {
        canvas.blit(
            Sprite::Obstacle {
                kind: obstacle.kind,
                variant: obstacle.variant,
            },
            obstacle.rect.x,
            obstacle.rect.y,
        )?;
    }

    canvas.text(&format!("Agents Alive: {}", overlay.alive), 25.0, 450.0, BLACK)?;
    canvas.text(&format!("Generation: {}", overlay.generation), 25.0, 480.0, BLACK)?;
    canvas.text(&format!("Game Speed: {}", state.speed), 25.0, 510.0, BLACK)?;
    canvas.text(
        &format!("Points: {}", state.score),
        config.world.field_width - 200.0,
        40.0,
        BLACK,
    )?;

    canvas.present()
}

fn draw_agent(canvas: &mut dyn Canvas, agent: &Agent<'_>, world: &World<'_>) -> DrawResult {
    // Blink while invulnerable
    if let Some(remaining) = agent.grace {
        if (remaining / 5) % 2 == 1 {
            return Ok(());
        }
    }

    let sprite = match agent.state {
        Locomotion::Running => Sprite::Running,
        Locomotion::Jumping => Sprite::Jumping,
        Locomotion::Crouching => Sprite::Crouching,
    };
    canvas.blit(sprite, agent.rect.x, agent.rect.y)?;

    let crouching = agent.state == Locomotion::Crouching;
    canvas.rect(agent.rect, if crouching { RED } else { GREEN }, 2)?;

    // Sight lines from the head to every obstacle
    let head = if crouching {
        (agent.rect.x + 54.0, agent.rect.bottom() - 5.0)
    } else {
        (agent.rect.x + 54.0, agent.rect.y + 12.0)
    };
    for obstacle in world.state.obstacles.iter() {
        canvas.line(head, obstacle.rect.center(), agent.color, 2)?;
    }

    Ok(())
}

/// Canvas that draws nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCanvas;

impl Canvas for NullCanvas {
    fn clear(&mut self, _color: Color) -> DrawResult {
        Ok(())
    }
    fn blit(&mut self, _sprite: Sprite, _x: f32, _y: f32) -> DrawResult {
        Ok(())
    }
    fn rect(&mut self, _rect: Rect, _color: Color, _thickness: u32) -> DrawResult {
        Ok(())
    }
    fn line(&mut self, _from: (f32, f32), _to: (f32, f32), _color: Color, _thickness: u32) -> DrawResult {
        Ok(())
    }
    fn text(&mut self, _text: &str, _x: f32, _y: f32, _color: Color) -> DrawResult {
        Ok(())
    }
}

/// One recorded draw call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    Clear(Color),
    Blit { sprite: Sprite, x: f32, y: f32 },
    Rect { rect: Rect, color: Color, thickness: u32 },
    Line { from: (f32, f32), to: (f32, f32), color: Color, thickness: u32 },
    Text { text: String, x: f32, y: f32, color: Color },
}

/// Canvas that keeps every frame as a list of draw commands
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RecordingCanvas {
    pub frames: Vec<Vec<DrawCommand>>,
    current: Vec<DrawCommand>,
}

impl RecordingCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn record(&mut self, command: DrawCommand) -> DrawResult {
        self.current.push(command);
        Ok(())
    }
}

impl Canvas for RecordingCanvas {
    fn clear(&mut self, color: Color) -> DrawResult {
        self.record(DrawCommand::Clear(color))
    }
    fn blit(&mut self, sprite: Sprite, x: f32, y: f32) -> DrawResult {
        self.record(DrawCommand::Blit { sprite, x, y })
    }
    fn rect(&mut self, rect: Rect, color: Color, thickness: u32) -> DrawResult {
        self.record(DrawCommand::Rect {
            rect,
            color,
            thickness,
        })
    }
    fn line(&mut self, from: (f32, f32), to: (f32, f32), color: Color, thickness: u32) -> DrawResult {
        self.record(DrawCommand::Line {
            from,
            to,
            color,
            thickness,
        })
    }
    fn text(&mut self, text: &str, x: f32, y: f32, color: Color) -> DrawResult {
        self.record(DrawCommand::Text {
            text: text.to_string(),
            x,
            y,
            color,
        })
    }
    fn present(&mut self) -> DrawResult {
        self.frames.push(std::mem::take(&mut self.current));
        Ok(())
    }
}

/// Blocks so that ticks happen at most `fps` times per second
#[derive(Debug)]
pub struct FramePacer {
    frame: Duration,
    next: Instant,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        let frame = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        Self {
            frame,
            next: Instant::now() + frame,
        }
    }

    /// Sleep until the next frame boundary
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
            self.next += self.frame;
        } else {
            // Running behind; don't try to catch up
            self.next = now + self.frame;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::NullController;
    use crate::config::Config;
    use crate::neural::Genome;
    use crate::obstacle::Obstacle;

    struct FailingCanvas;

    impl Canvas for FailingCanvas {
        fn clear(&mut self, _color: Color) -> DrawResult {
            Err(RenderError("no surface".into()))
        }
        fn blit(&mut self, _sprite: Sprite, _x: f32, _y: f32) -> DrawResult {
            Ok(())
        }
        fn rect(&mut self, _rect: Rect, _color: Color, _thickness: u32) -> DrawResult {
            Ok(())
        }
        fn line(&mut self, _from: (f32, f32), _to: (f32, f32), _color: Color, _thickness: u32) -> DrawResult {
            Ok(())
        }
        fn text(&mut self, _text: &str, _x: f32, _y: f32, _color: Color) -> DrawResult {
            Ok(())
        }
    }

    fn world_with_one_agent<'g>(genome: &'g mut Genome, config: &Config) -> World<'g> {
        let agent = Agent::new(genome, Box::new(NullController), &config.agent, &config.world);
        let mut world = World::new_with_seed(config, vec![agent], 0);
        world.state.obstacles.push(Obstacle::new(
            ObstacleKind::FlyingHigh,
            0,
            Rect::new(900.0, 150.0, 97.0, 68.0),
        ));
        world
    }

    #[test]
    fn test_recording_canvas_frame() {
        let config = Config::default();
        let mut genome = Genome::empty(1);
        let world = world_with_one_agent(&mut genome, &config);
        let mut canvas = RecordingCanvas::new();

        draw_frame(&mut canvas, &world, &Overlay { generation: 3, alive: 1 }).unwrap();

        assert_eq!(canvas.frame_count(), 1);
        let frame = &canvas.frames[0];
        assert_eq!(frame[0], DrawCommand::Clear(WHITE));
        assert!(frame.iter().any(|c| matches!(c, DrawCommand::Rect { color, .. } if *color == GREEN)));
        assert_eq!(frame.iter().filter(|c| matches!(c, DrawCommand::Line { .. })).count(), 1);
        assert!(frame
            .iter()
            .any(|c| matches!(c, DrawCommand::Text { text, .. } if text == "Generation: 3")));
    }

    #[test]
    fn test_invulnerable_agent_blinks() {
        let config = Config::default();
        let mut genome = Genome::empty(1);
        let mut world = world_with_one_agent(&mut genome, &config);
        world.agents[0].grace = Some(7);
        let mut canvas = RecordingCanvas::new();

        draw_frame(&mut canvas, &world, &Overlay::default()).unwrap();

        let frame = &canvas.frames[0];
        assert!(!frame.iter().any(|c| matches!(c, DrawCommand::Rect { .. })));
    }

    #[test]
    fn test_failure_is_reported() {
        let config = Config::default();
        let mut genome = Genome::empty(1);
        let world = world_with_one_agent(&mut genome, &config);

        assert!(draw_frame(&mut FailingCanvas, &world, &Overlay::default()).is_err());
    }

    #[test]
    fn test_pacer_does_not_block_long() {
        let mut pacer = FramePacer::new(1000);
        let start = Instant::now();
        for _ in 0..5 {
            pacer.wait();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
