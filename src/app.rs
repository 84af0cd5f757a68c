use crate::audio::{NullDevice, PlaybackDevice, RodioDevice};
use crate::catalog;
use crate::model::{Episode, PlayerConfig};
use crate::session::Session;
use anyhow::Result;
use std::io::{BufRead, stdin};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const INPUT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub struct AppStartupOptions {
    pub catalog: Option<PathBuf>,
    pub start_index: Option<usize>,
    pub null_device: bool,
}

pub fn run_with_startup(options: AppStartupOptions, config: PlayerConfig) -> Result<()> {
    let episodes = match &options.catalog {
        Some(path) => catalog::load_episodes(path)?,
        None => Vec::new(),
    };
    info!(episodes = episodes.len(), "catalog loaded");

    let device: Box<dyn PlaybackDevice> = if options.null_device {
        Box::new(NullDevice::new())
    } else {
        match RodioDevice::new() {
            Ok(device) => Box::new(device),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "falling back to null device");
                Box::new(NullDevice::new())
            }
        }
    };

    let mut session: Session = Session::new(device, config);
    if let Some(start) = options.start_index
        && session.play_list(episodes.clone(), start).is_err()
    {
        println!("{}", session.status);
    }
    println!("{}", session.describe());

    let lines = spawn_line_reader();
    let mut last_tick = Instant::now();
    loop {
        match lines.recv_timeout(INPUT_POLL) {
            Ok(line) => {
                if !run_command(&mut session, &episodes, &line) {
                    break;
                }
                println!("{}", session.status);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_tick.elapsed() >= TICK_INTERVAL {
            session.pump();
            last_tick = Instant::now();
        }
    }

    info!("session closed");
    Ok(())
}

fn spawn_line_reader() -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        for line in stdin().lock().lines().map_while(std::result::Result::ok) {
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}

/// Applies one typed command. Returns `false` when the user asked to quit.
pub fn run_command<D: PlaybackDevice>(
    session: &mut Session<D>,
    episodes: &[Episode],
    raw: &str,
) -> bool {
    let input = raw.trim();
    if input.is_empty() {
        session.status = String::from("No command");
        return true;
    }

    let mut command_split = input.splitn(2, char::is_whitespace);
    let command = command_split.next().unwrap_or_default();
    let rest = command_split.next().unwrap_or("").trim();

    match command {
        "help" => {
            session.status = String::from(
                "Commands: catalog | play <n> | list [n] | pause | next | prev | loop | shuffle | seek <s> | ff | rew | clear | status | quit",
            );
        }
        "catalog" => {
            session.status = if episodes.is_empty() {
                String::from("Catalog is empty")
            } else {
                episodes
                    .iter()
                    .enumerate()
                    .map(|(index, episode)| {
                        format!(
                            "{index:>3}  {} ({}s) {}",
                            episode.title, episode.duration, episode.members
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };
        }
        "play" => match parse_index(rest, episodes.len()) {
            Ok(index) => session.play_episode(episodes[index].clone()),
            Err(message) => session.status = message,
        },
        "list" => {
            let start = if rest.is_empty() {
                Ok(0)
            } else {
                rest.parse::<usize>()
                    .map_err(|_| String::from("Usage: list [index]"))
            };
            match start {
                Ok(start) => {
                    if let Err(err) = session.play_list(episodes.to_vec(), start) {
                        debug!(error = %err, "list start rejected");
                    }
                }
                Err(message) => session.status = message,
            }
        }
        "pause" => {
            if session.controller().can_control() {
                session.toggle_pause();
            } else {
                session.status = String::from("Nothing is playing");
            }
        }
        "next" => session.next(),
        "prev" => session.previous(),
        "loop" => session.toggle_loop(),
        "shuffle" => {
            if session.controller().can_toggle_shuffle() {
                session.toggle_shuffle();
            } else {
                session.status = String::from("Shuffle needs at least two episodes");
            }
        }
        "seek" => match rest.parse::<u32>() {
            Ok(seconds) => {
                session.seek(seconds);
                session.status = session.describe();
            }
            Err(_) => session.status = String::from("Usage: seek <seconds>"),
        },
        "ff" => {
            session.scrub_forward();
            session.status = session.describe();
        }
        "rew" => {
            session.scrub_backward();
            session.status = session.describe();
        }
        "clear" => session.clear(),
        "status" => session.status = session.describe(),
        "quit" | "exit" => return false,
        _ => session.status = String::from("Unknown command. Use help"),
    }
    true
}

fn parse_index(raw: &str, len: usize) -> std::result::Result<usize, String> {
    let index = raw
        .parse::<usize>()
        .map_err(|_| String::from("Usage: play <index>"))?;
    if index >= len {
        return Err(format!("No episode {index} in a catalog of {len}"));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransportController;
    use crate::model::StartIndexPolicy;

    fn episodes() -> Vec<Episode> {
        ["first", "second", "third"]
            .iter()
            .map(|title| Episode {
                title: title.to_string(),
                thumbnail: String::new(),
                members: String::from("crew"),
                published_at: String::new(),
                duration: 120,
                url: format!("{title}.mp3"),
            })
            .collect()
    }

    fn session() -> Session<NullDevice> {
        Session::with_controller(
            TransportController::with_seed(9),
            NullDevice::new(),
            PlayerConfig::default(),
        )
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut session = session();
        assert!(run_command(&mut session, &episodes(), "wat"));
        assert!(session.status.contains("Unknown command"));
    }

    #[test]
    fn pause_without_episode_is_inert() {
        let mut session = session();
        run_command(&mut session, &episodes(), "pause");
        assert_eq!(session.status, "Nothing is playing");
        assert!(!session.controller().is_playing());
    }

    #[test]
    fn quit_stops_the_loop() {
        let mut session = session();
        assert!(!run_command(&mut session, &episodes(), "quit"));
    }

    #[test]
    fn play_selects_a_single_episode() {
        let mut session = session();
        run_command(&mut session, &episodes(), "play 1");

        assert_eq!(session.controller().queue().len(), 1);
        assert_eq!(
            session.controller().current_item().map(|e| e.title.as_str()),
            Some("second")
        );
        assert_eq!(session.device().current_source(), Some("second.mp3"));
    }

    #[test]
    fn play_rejects_missing_index() {
        let mut session = session();
        run_command(&mut session, &episodes(), "play 7");
        assert_eq!(session.status, "No episode 7 in a catalog of 3");
        assert!(session.controller().current_item().is_none());
    }

    #[test]
    fn list_then_navigate() {
        let mut session = session();
        let catalog = episodes();
        run_command(&mut session, &catalog, "list 1");
        run_command(&mut session, &catalog, "next");
        assert_eq!(session.controller().current_index(), Some(2));

        run_command(&mut session, &catalog, "next");
        assert_eq!(session.status, "No next episode");

        run_command(&mut session, &catalog, "prev");
        assert_eq!(session.controller().current_index(), Some(1));
    }

    #[test]
    fn list_with_rejected_start_reports_status() {
        let config = PlayerConfig {
            start_index_policy: StartIndexPolicy::Reject,
            ..PlayerConfig::default()
        };
        let mut session =
            Session::with_controller(TransportController::with_seed(9), NullDevice::new(), config);
        assert!(run_command(&mut session, &episodes(), "list 5"));

        assert_eq!(
            session.status,
            "start index 5 is out of bounds for a queue of 3"
        );
        assert!(session.controller().current_item().is_none());
    }

    #[test]
    fn shuffle_is_gated_on_queue_size() {
        let mut session = session();
        let catalog = episodes();
        run_command(&mut session, &catalog, "play 0");
        run_command(&mut session, &catalog, "shuffle");
        assert!(!session.controller().is_shuffling());

        run_command(&mut session, &catalog, "list");
        run_command(&mut session, &catalog, "shuffle");
        assert!(session.controller().is_shuffling());
    }

    #[test]
    fn seek_reports_position() {
        let mut session = session();
        let catalog = episodes();
        run_command(&mut session, &catalog, "play 0");
        run_command(&mut session, &catalog, "seek 42");
        assert_eq!(session.controller().progress_seconds(), 42);
        assert!(session.status.contains("42s/120s"));
    }
}
