//! Line-oriented staff console
//!
//! One command per line on stdin. Unknown or malformed commands are
//! reported back and never stop the player.

use crate::error::{Error, Result};
use crate::playback::PlaybackEngine;
use ambi_common::{Rating, RepeatMode, TrackId};
use std::fmt::Write as _;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

pub const HELP: &str = "\
commands:
  play [track-id]        resume, or play a queued track
  pause | resume | toggle
  next | prev
  stop
  vol <0..1>
  shuffle on|off
  repeat none|one|all
  like | dislike         rate the current track
  seek <secs>
  status | queue | help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(Option<TrackId>),
    Pause,
    Resume,
    Toggle,
    Next,
    Previous,
    Stop,
    Volume(f32),
    Shuffle(bool),
    Repeat(RepeatMode),
    Rate(Rating),
    Seek(Duration),
    Status,
    Queue,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .ok_or_else(|| Error::InvalidInput("empty command".to_string()))?
            .to_lowercase();
        let arg = words.next();
        if words.next().is_some() {
            return Err(Error::InvalidInput(format!("too many arguments to '{verb}'")));
        }

        let command = match (verb.as_str(), arg) {
            ("play", id) => Command::Play(id.map(TrackId::from)),
            ("pause", None) => Command::Pause,
            ("resume", None) => Command::Resume,
            ("toggle", None) => Command::Toggle,
            ("next" | "skip", None) => Command::Next,
            ("prev" | "previous", None) => Command::Previous,
            ("stop", None) => Command::Stop,
            ("vol" | "volume", Some(value)) => Command::Volume(
                value
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("bad volume '{value}'")))?,
            ),
            ("shuffle", Some(value)) => Command::Shuffle(parse_switch(value)?),
            ("repeat", Some(value)) => Command::Repeat(
                value
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("bad repeat mode '{value}'")))?,
            ),
            ("like", None) => Command::Rate(Rating::Like),
            ("dislike", None) => Command::Rate(Rating::Dislike),
            ("unrate", None) => Command::Rate(Rating::Neutral),
            ("seek", Some(value)) => {
                let secs: f64 = value
                    .parse()
                    .map_err(|_| Error::InvalidInput(format!("bad position '{value}'")))?;
                Command::Seek(ambi_common::time::secs_to_duration(secs))
            }
            ("status", None) => Command::Status,
            ("queue", None) => Command::Queue,
            ("help" | "?", None) => Command::Help,
            ("quit" | "exit", None) => Command::Quit,
            (verb, _) => {
                return Err(Error::InvalidInput(format!(
                    "unknown command or arguments: '{verb}' (try 'help')"
                )))
            }
        };
        Ok(command)
    }
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(Error::InvalidInput(format!("expected on|off, got '{other}'"))),
    }
}

/// Result of one console command
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Text to show staff; may be empty
    Reply(String),
    Quit,
}

pub async fn execute(engine: &PlaybackEngine, command: Command) -> Result<Outcome> {
    let reply = match command {
        Command::Play(None) | Command::Resume => {
            engine.resume().await?;
            String::new()
        }
        Command::Play(Some(track_id)) => {
            let snapshot = engine.queue().snapshot().await;
            let track = snapshot
                .index_of(&track_id)
                .and_then(|index| snapshot.track(index).cloned())
                .ok_or_else(|| Error::NotFound(format!("track {track_id} is not queued")))?;
            engine.play(track, true).await?;
            String::new()
        }
        Command::Pause => {
            engine.pause().await?;
            String::new()
        }
        Command::Toggle => {
            engine.toggle_play().await?;
            String::new()
        }
        Command::Next => {
            engine.next(true).await?;
            String::new()
        }
        Command::Previous => {
            engine.previous().await?;
            String::new()
        }
        Command::Stop => {
            engine.stop().await?;
            String::new()
        }
        Command::Volume(volume) => {
            engine.set_volume(volume).await?;
            format!("volume {:.2}", engine.volume().await)
        }
        Command::Shuffle(on) => {
            engine.set_shuffle(on).await;
            format!("shuffle {}", if on { "on" } else { "off" })
        }
        Command::Repeat(mode) => {
            engine.set_repeat(mode).await;
            format!("repeat {mode}")
        }
        Command::Rate(rating) => {
            engine.rate_current(rating).await?;
            format!("rated {rating}")
        }
        Command::Seek(position) => {
            engine.seek(position).await?;
            String::new()
        }
        Command::Status => render_status(engine).await,
        Command::Queue => render_queue(engine).await,
        Command::Help => HELP.to_string(),
        Command::Quit => return Ok(Outcome::Quit),
    };
    Ok(Outcome::Reply(reply))
}

async fn render_status(engine: &PlaybackEngine) -> String {
    let status = engine.status().await;
    let now_playing = match &status.current {
        Some(track) => format!("{} \"{}\" by {}", track.id, track.title, track.artist),
        None => "nothing".to_string(),
    };
    format!(
        "{} ({:?}) on {}: {} [{:.0}s / {}] volume {:.2}, shuffle {}, repeat {}",
        status.state,
        status.transition,
        status.active_channel,
        now_playing,
        status.position_secs,
        status
            .duration_secs
            .map(|d| format!("{d:.0}s"))
            .unwrap_or_else(|| "?".to_string()),
        status.volume,
        if status.shuffle { "on" } else { "off" },
        status.repeat
    )
}

async fn render_queue(engine: &PlaybackEngine) -> String {
    let snapshot = engine.queue().snapshot().await;
    if snapshot.is_empty() {
        return "queue is empty".to_string();
    }
    let current = snapshot.current_index();
    let mut out = String::new();
    for (index, entry) in snapshot.entries.iter().enumerate() {
        let marker = if Some(index) == current { '>' } else { ' ' };
        let _ = writeln!(
            out,
            "{marker} {:>3}. {} \"{}\" [{}]{}",
            index + 1,
            entry.track.id,
            entry.track.title,
            entry.position,
            if entry.track.is_disliked() { " (disliked)" } else { "" }
        );
    }
    out.trim_end().to_string()
}

/// Read commands from `input` until EOF or `quit`
pub async fn run<R>(engine: &PlaybackEngine, input: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Console input closed");
                break;
            }
            Err(e) => {
                warn!("Console read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let outcome = match line.parse::<Command>() {
            Ok(command) => execute(engine, command).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(Outcome::Reply(text)) if !text.is_empty() => println!("{text}"),
            Ok(Outcome::Reply(_)) => {}
            Ok(Outcome::Quit) => break,
            Err(e) => println!("error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("pause".parse::<Command>().unwrap(), Command::Pause);
        assert_eq!(" NEXT ".parse::<Command>().unwrap(), Command::Next);
        assert_eq!("prev".parse::<Command>().unwrap(), Command::Previous);
        assert_eq!("play".parse::<Command>().unwrap(), Command::Play(None));
        assert_eq!(
            "play t42".parse::<Command>().unwrap(),
            Command::Play(Some(TrackId::from("t42")))
        );
        assert_eq!("dislike".parse::<Command>().unwrap(), Command::Rate(Rating::Dislike));
        assert_eq!("quit".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!("vol 0.5".parse::<Command>().unwrap(), Command::Volume(0.5));
        assert_eq!("shuffle on".parse::<Command>().unwrap(), Command::Shuffle(true));
        assert_eq!("shuffle OFF".parse::<Command>().unwrap(), Command::Shuffle(false));
        assert_eq!(
            "repeat all".parse::<Command>().unwrap(),
            Command::Repeat(RepeatMode::All)
        );
        assert_eq!(
            "seek 12.5".parse::<Command>().unwrap(),
            Command::Seek(Duration::from_millis(12_500))
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for line in ["", "dance", "vol", "vol loud", "shuffle maybe", "pause now", "seek x"] {
            assert!(line.parse::<Command>().is_err(), "accepted '{line}'");
        }
    }
}
