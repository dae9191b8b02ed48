use defeatfx::display::{Display, InputEvent, PixelBuffer, RenderTarget, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use defeatfx::effects::{enable_all, DefeatEffect, Effect, EffectConfig, Stage};
use defeatfx::image::Image;
use defeatfx::mqtt::{TriggerAction, TriggerCommand, TriggerListener};
use defeatfx::util::FrameClock;
use sdl2::keyboard::Keycode;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SPRITE_SIZE: u32 = 96;

struct Options {
    width: u32,
    height: u32,
    vsync: bool,
    config: Option<String>,
    save_config: Option<String>,
    mqtt_host: Option<String>,
    topic: String,
}

/// Parse command line arguments
fn parse_args() -> Options {
    let args: Vec<String> = std::env::args().collect();
    let mut opts = Options {
        width: DEFAULT_WIDTH,
        height: DEFAULT_HEIGHT,
        vsync: true,
        config: None,
        save_config: None,
        mqtt_host: None,
        topic: TriggerListener::default_topic().to_string(),
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--no-vsync" => opts.vsync = false,
            "--width" | "-w" => {
                if let Some(w) = value.and_then(|v| v.parse().ok()) {
                    opts.width = w;
                }
                i += 1;
            },
            "--height" | "-h" => {
                if let Some(h) = value.and_then(|v| v.parse().ok()) {
                    opts.height = h;
                }
                i += 1;
            },
            "--config" | "-c" => {
                opts.config = value.cloned();
                i += 1;
            },
            "--save-config" => {
                opts.save_config = value.cloned();
                i += 1;
            },
            "--mqtt" => {
                opts.mqtt_host = value.cloned();
                i += 1;
            },
            "--topic" => {
                if let Some(t) = value {
                    opts.topic = t.clone();
                }
                i += 1;
            },
            "--help" => {
                println!("Usage: defeatfx [OPTIONS]");
                println!();
                println!("Options:");
                println!("  --width W, -w W       Set window width (default: {})", DEFAULT_WIDTH);
                println!("  --height H, -h H      Set window height (default: {})", DEFAULT_HEIGHT);
                println!("  --config PATH, -c     Effect config JSON");
                println!("  --save-config PATH    Write the effective config as JSON and exit");
                println!("  --mqtt HOST           Listen for triggers on an MQTT broker");
                println!("  --topic TOPIC         MQTT topic (default: {})", TriggerListener::default_topic());
                println!("  --no-vsync            Disable VSync for uncapped framerate");
                println!("  --help                Show this help message");
                println!();
                println!("Controls:");
                println!("  Click / Space  - Defeat every sprite");
                println!("  1 2 3          - Defeat one sprite");
                println!("  R              - Re-arm all sprites");
                println!("  Escape         - Quit");
                std::process::exit(0);
            },
            other => warn!(arg = other, "unknown argument ignored"),
        }
        i += 1;
    }

    opts
}

/// A sprite on screen: its original image and the effect that owns the
/// processed copy
struct Sprite {
    source: Image,
    effect: DefeatEffect,
    x: i32,
    y: i32,
}

impl Sprite {
    /// Pixels or overlay change every tick while a timed stage runs
    fn is_animating(&self) -> bool {
        matches!(self.effect.stage(), Stage::WhiteoutIn | Stage::Dissolve)
    }

    fn rearm(&mut self, config: EffectConfig) {
        if let Err(e) = self.effect.arm(Some(&self.source), config) {
            error!(sprite = self.effect.name(), error = %e, "re-arm failed");
        }
    }
}

fn build_sprites(width: u32, height: u32, config: EffectConfig, defeated: &Rc<Cell<usize>>) -> Vec<Sprite> {
    let images = [
        ("blob", Image::blob(SPRITE_SIZE, (90, 200, 70), (24, 30, 20))),
        ("gem", Image::checker_gem(SPRITE_SIZE, 8, (240, 200, 60), (200, 80, 40))),
        ("ring", Image::ring(SPRITE_SIZE, 18.0, (80, 160, 240))),
    ];
    let slot = width as i32 / images.len() as i32;
    let y = (height as i32 - SPRITE_SIZE as i32) / 2;

    images
        .into_iter()
        .enumerate()
        .map(|(i, (name, source))| {
            let mut effect = DefeatEffect::new(name);
            let counter = Rc::clone(defeated);
            effect.on_completed(move |_| counter.set(counter.get() + 1));
            let mut sprite = Sprite {
                source,
                effect,
                x: slot * i as i32 + (slot - SPRITE_SIZE as i32) / 2,
                y,
            };
            sprite.rearm(config);
            sprite
        })
        .collect()
}

fn apply_trigger(sprites: &mut [Sprite], cmd: &TriggerCommand, config: EffectConfig) {
    info!(action = ?cmd.action, targets = ?cmd.targets, "remote trigger");
    for (i, sprite) in sprites.iter_mut().enumerate() {
        if !cmd.targets(i) {
            continue;
        }
        match cmd.action {
            TriggerAction::Defeat => sprite.effect.set_enabled(true),
            TriggerAction::Reset => sprite.rearm(config),
        }
    }
}

fn count_defeated(sprites: &[Sprite]) -> usize {
    sprites
        .iter()
        .filter(|s| s.effect.stage() == Stage::Done)
        .count()
}

fn draw_progress(buffer: &mut PixelBuffer, sprite: &Sprite) {
    let bar_y = sprite.y + SPRITE_SIZE as i32 + 8;
    buffer.fill_rect(sprite.x, bar_y, SPRITE_SIZE, 4, 40, 40, 48);
    let filled = (SPRITE_SIZE as f32 * sprite.effect.progress()) as u32;
    buffer.fill_rect(sprite.x, bar_y, filled, 4, 0xEE, 0x66, 0xFF);
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts = parse_args();

    let config = match &opts.config {
        Some(path) => EffectConfig::load(path).unwrap_or_else(|e| {
            warn!(path = %path, error = %e, "failed to load config, using defaults");
            EffectConfig::default()
        }),
        None => EffectConfig::default(),
    };
    info!(?config, "effect config");

    if let Some(path) = &opts.save_config {
        config.save(path).map_err(|e| e.to_string())?;
        info!(path = %path, "config written");
        return Ok(());
    }

    let trigger = opts.mqtt_host.as_deref().and_then(|host| {
        TriggerListener::connect(host, &opts.topic)
            .map_err(|e| error!(error = %e, "MQTT trigger disabled"))
            .ok()
    });

    let (mut display, texture_creator) =
        Display::with_options("defeatfx", opts.width, opts.height, opts.vsync)?;
    let mut target = RenderTarget::with_size(&texture_creator, opts.width, opts.height)?;
    let mut buffer = PixelBuffer::with_size(opts.width, opts.height);

    let defeated = Rc::new(Cell::new(0usize));
    let mut sprites = build_sprites(opts.width, opts.height, config, &defeated);
    let mut reported = 0;
    let mut redraw = true;

    let mut clock = FrameClock::new(60);

    'main: loop {
        let (dt, _avg_fps) = clock.tick();

        for event in display.poll_events() {
            match event {
                InputEvent::Quit | InputEvent::KeyDown(Keycode::Escape) => break 'main,
                InputEvent::Click { .. } | InputEvent::KeyDown(Keycode::Space) => {
                    let started = enable_all(sprites.iter_mut().map(|s| &mut s.effect));
                    info!(started, "defeat triggered");
                },
                InputEvent::KeyDown(Keycode::Num1) => sprites[0].effect.set_enabled(true),
                InputEvent::KeyDown(Keycode::Num2) => sprites[1].effect.set_enabled(true),
                InputEvent::KeyDown(Keycode::Num3) => sprites[2].effect.set_enabled(true),
                InputEvent::KeyDown(Keycode::R) => {
                    for sprite in &mut sprites {
                        sprite.rearm(config);
                    }
                    defeated.set(count_defeated(&sprites));
                    reported = defeated.get();
                    info!("sprites re-armed");
                },
                InputEvent::KeyDown(_) => {},
            }
        }

        if let Some(trigger) = &trigger {
            for cmd in trigger.poll() {
                apply_trigger(&mut sprites, &cmd, config);
                if cmd.action == TriggerAction::Reset {
                    // Only the re-armed sprites can complete again
                    defeated.set(count_defeated(&sprites));
                    reported = defeated.get();
                }
            }
        }

        for sprite in &mut sprites {
            sprite.effect.update(dt);
            redraw |= sprite.effect.take_dirty();
            redraw |= sprite.is_animating();
        }
        if defeated.get() != reported {
            reported = defeated.get();
            if reported == sprites.len() {
                info!("all sprites defeated");
            }
        }

        if redraw {
            buffer.checkerboard(16, (34, 34, 40), (44, 44, 52));
            for sprite in &sprites {
                sprite.effect.render(&mut buffer, sprite.x, sprite.y);
                draw_progress(&mut buffer, sprite);
            }
            redraw = false;
        }

        display.present(&mut target, &buffer)?;
    }

    Ok(())
}
