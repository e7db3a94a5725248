use scribe_engine::dispatch::dispatch;
use scribe_engine::protocol::{Command, Response};
use scribe_engine::session::Recorder;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

#[derive(Debug)]
enum ReplInput {
    Command(Command),
    Steps,
    Help,
    Unknown(String),
    Skip,
    Exit,
}

fn classify_line(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplInput::Skip;
    }
    if EXIT_COMMANDS.contains(&trimmed) {
        return ReplInput::Exit;
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    match words.as_slice() {
        ["start"] => ReplInput::Command(Command::StartRecording),
        ["stop"] => ReplInput::Command(Command::stop(None)),
        ["stop", destination] => ReplInput::Command(Command::stop(Some(destination.to_string()))),
        ["status"] => ReplInput::Command(Command::GetStatus),
        ["steps"] => ReplInput::Steps,
        ["help"] => ReplInput::Help,
        _ => ReplInput::Unknown(trimmed.to_string()),
    }
}

fn render(response: &Response) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| format!("<unprintable: {}>", e))
}

/// Interactive control loop on stdin. Returns on EOF, `exit`/`quit` or Ctrl-C.
pub async fn run(recorder: &Recorder) -> io::Result<()> {
    println!("Commands: start, stop [destination], status, steps, quit");

    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let line = tokio::select! {
            line = reader.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        match classify_line(&line) {
            ReplInput::Command(command) => println!("{}", render(&dispatch(recorder, command).await)),
            ReplInput::Steps => {
                for step in recorder.steps().await {
                    let marker = if step.has_screenshot() { "*" } else { " " };
                    println!("{:>3}{} {:<7} {}", step.step_number, marker, step.action, step.label);
                }
            }
            ReplInput::Help => {
                println!("start               begin a recording session");
                println!("stop [destination]  finish and deliver the session");
                println!("status              show the recording state");
                println!("steps               list steps recorded so far");
                println!("quit                leave (an active session resumes on restart)");
            }
            ReplInput::Unknown(input) => println!("Unknown command: {}", input),
            ReplInput::Skip => continue,
            ReplInput::Exit => break,
        }
    }
    Ok(())
}
