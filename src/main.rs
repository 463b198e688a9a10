use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use meetscribe::core::api::{LoginRequest, OtpVerifyRequest, SignupRequest};
use meetscribe::core::transcripts::Transcript;
use meetscribe::App;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a new account (an OTP code is emailed to you)
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        password: String,
    },
    /// Verify the emailed OTP code and sign in
    VerifyOtp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        code: String,
    },
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget stored tokens
    Logout,
    /// Show the currently signed-in user
    Whoami,
    /// Upload an audio file for transcription
    Upload {
        file: PathBuf,
        /// Wait for the transcription to reach DONE or FAILED
        #[arg(long)]
        wait: bool,
    },
    /// List transcripts (paginated)
    List {
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a single transcript by id
    Show { id: i64 },
    /// Check processing status of a transcript
    Status { id: i64 },
    /// Show the most recent transcript
    Latest,
    /// Control the meeting bot
    Zoom {
        #[command(subcommand)]
        action: ZoomAction,
    },
}

#[derive(Subcommand, Debug)]
enum ZoomAction {
    /// Send the bot into a meeting
    Join { meeting_link: String },
    /// End a bot session; transcription of captured audio starts server-side
    End {
        bot_id: String,
        /// Wait for the resulting transcript to finish
        #[arg(long)]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meetscribe=info".into()),
        )
        .init();

    let args = Args::parse();
    let app = App::new().await?;

    match args.command {
        Command::Signup {
            email,
            full_name,
            password,
        } => {
            let message = app
                .session
                .signup(SignupRequest {
                    email,
                    full_name,
                    password,
                })
                .await?;
            println!("{message}");
            println!("Run `meetscribe verify-otp` with the code from your inbox to finish.");
        }
        Command::VerifyOtp { email, code } => {
            app.session
                .verify_otp(OtpVerifyRequest {
                    email,
                    otp_code: code,
                })
                .await?;
            print_signed_in(&app);
        }
        Command::Login { email, password } => {
            app.session.login(LoginRequest { email, password }).await?;
            print_signed_in(&app);
        }
        Command::Logout => {
            app.session.logout();
            println!("Signed out.");
        }
        Command::Whoami => match app.session.user() {
            Some(user) => {
                println!("{} <{}>", user.full_name, user.email);
                println!(
                    "id: {}  active: {}  verified: {}",
                    user.id, user.is_active, user.is_verified
                );
            }
            None => println!("Not signed in."),
        },
        Command::Upload { file, wait } => {
            info!("Uploading audio file: {}", file.display());
            let accepted = app.transcripts.upload_audio(file).await;
            if !accepted {
                let state = app.transcripts.state();
                anyhow::bail!(
                    "upload failed: {}",
                    state.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }

            let state = app.transcripts.state();
            if state.loading {
                // Async path: the server queued the job and we are polling.
                if wait {
                    app.transcripts.wait_for_all_polls().await;
                    print_result(&app);
                } else {
                    println!("Upload accepted; transcription is processing.");
                    println!("Check progress with `meetscribe list`.");
                    app.transcripts.stop_all_polls();
                }
            } else {
                print_result(&app);
            }
        }
        Command::List { skip, limit } => {
            app.transcripts.load_transcript_list(skip, limit).await?;
            let state = app.transcripts.state();
            println!(
                "{} transcript(s), showing {}..{}",
                state.total,
                state.skip,
                state.skip + state.transcripts.len() as i64
            );
            for t in &state.transcripts {
                println!(
                    "  #{:<6} {:<10} {}",
                    t.id,
                    t.status.as_str(),
                    t.created_at
                );
            }
        }
        Command::Show { id } => {
            let transcript = app.transcripts.select_transcript(id).await?;
            print_transcript(&transcript);
        }
        Command::Status { id } => {
            let status = app.transcripts.check_status(id).await?;
            println!("#{} {}", status.id, status.status.as_str());
            if let Some(error) = &status.error_message {
                println!("error: {error}");
            }
        }
        Command::Latest => {
            let transcript = app.transcripts.latest_transcript().await?;
            print_transcript(&transcript);
        }
        Command::Zoom { action } => match action {
            ZoomAction::Join { meeting_link } => {
                let resp = app.transcripts.join_meeting(meeting_link).await?;
                println!("{}", resp.message);
                println!("bot id: {}", resp.bot_id);
            }
            ZoomAction::End { bot_id, wait } => {
                let resp = app.transcripts.end_meeting(bot_id).await?;
                println!("{}", resp.message);
                if let Some(summary) = &resp.transcript {
                    if let Some(id) = summary.transcript_id {
                        if wait {
                            app.transcripts.wait_for_poll(id).await;
                            print_result(&app);
                        } else {
                            println!("Transcript #{id} is processing.");
                            app.transcripts.stop_all_polls();
                        }
                    } else if let Some(error) = &summary.error {
                        println!("Transcription not started: {error}");
                    }
                }
            }
        },
    }

    Ok(())
}

fn print_signed_in(app: &App) {
    match app.session.user() {
        Some(user) => println!("Signed in as {} <{}>", user.full_name, user.email),
        None => println!("Signed in."),
    }
}

fn print_result(app: &App) {
    let state = app.transcripts.state();
    if let Some(error) = &state.error {
        println!("Transcription failed: {error}");
        return;
    }

    println!("\n=== Transcription ===");
    println!("{}", state.full_text);
    println!("=====================\n");
    if let Some(language) = &state.language {
        info!("Language: {language}");
    }
    for segment in &state.segments {
        println!(
            "[{:>7.2} - {:>7.2}] {}: {}",
            segment.start, segment.end, segment.speaker, segment.text
        );
    }
}

fn print_transcript(transcript: &Transcript) {
    println!(
        "#{} {} (created {})",
        transcript.id,
        transcript.status.as_str(),
        transcript.created_at
    );
    if let Some(language) = &transcript.language {
        println!("language: {language}");
    }
    if let Some(text) = &transcript.full_text {
        println!("\n=== Transcription ===");
        println!("{text}");
        println!("=====================\n");
    }
    if let Some(segments) = &transcript.segments {
        for segment in segments {
            println!(
                "[{:>7.2} - {:>7.2}] {}: {}",
                segment.start, segment.end, segment.speaker, segment.text
            );
        }
    }
    if let Some(error) = &transcript.error_message {
        println!("error: {error}");
    }
}
