use std::io::{self, Write};

use clap::Parser;
use colored::Colorize;
use serde::{Deserialize, Serialize};

#[derive(Debug, Parser)]
#[command(name = "la-chat", about = "Interactive participant client for the listener arena")]
struct Args {
    #[arg(long, default_value = "http://localhost:8080")]
    server: String,
    #[arg(long)]
    username: String,
    /// Prompted for when omitted.
    #[arg(long)]
    password: Option<String>,
    #[arg(long, default_value = "la_session")]
    cookie_name: String,
    /// Skip the pre-conversation questions.
    #[arg(long)]
    skip_presurvey: bool,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user_mode: String,
}

#[derive(Debug, Deserialize)]
struct ReplyOptions {
    response_id: usize,
    reply_options: [String; 2],
}

#[derive(Debug, Serialize)]
struct PreSurvey {
    description: String,
    keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PostSurvey {
    calm_excited: i64,
    unpleasant_pleasant: i64,
    supportiveness: i64,
    engagement: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    retryable: bool,
}

fn prompt_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut input = String::new();
    match io::stdin().read_line(&mut input) {
        Ok(0) => Ok(None),
        Ok(_) => Ok(Some(input.trim().to_owned())),
        Err(err) => Err(err),
    }
}

/// Ask until the answer parses as an integer in `range`; `None` on Enter or EOF.
fn prompt_scale(prompt: &str, range: std::ops::RangeInclusive<i64>) -> Option<i64> {
    loop {
        let input = match prompt_line(prompt) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(err) => {
                eprintln!("{}", format!("Error: failed to read input: {err}").red());
                return None;
            }
        };
        if input.is_empty() {
            return None;
        }
        match input.parse::<i64>() {
            Ok(value) if range.contains(&value) => return Some(value),
            _ => eprintln!(
                "{}",
                format!("Please enter a number from {} to {}.", range.start(), range.end())
                    .yellow()
            ),
        }
    }
}

async fn error_message(response: reqwest::Response) -> (String, bool) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (
            format!("({status}) {}", envelope.error.message),
            envelope.error.retryable,
        ),
        Err(_) => (format!("({status}) {body}"), false),
    }
}

/// What the chat loop does with one line of input.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Send(String),
    Skip,
    Quit,
}

/// EOF, `quit`/`exit` and unreadable stdin all end the conversation.
fn next_step(input: io::Result<Option<String>>) -> Step {
    match input {
        Ok(Some(line)) if line.is_empty() => Step::Skip,
        Ok(Some(line)) if matches!(line.as_str(), "quit" | "exit") => Step::Quit,
        Ok(Some(line)) => Step::Send(line),
        Ok(None) => {
            println!();
            Step::Quit
        }
        Err(err) => {
            eprintln!("{}", format!("Failed to read input: {err}").red());
            Step::Quit
        }
    }
}

// ---------------------------------------------------------------------------
// Session — cookie-carrying calls against the arena server
// ---------------------------------------------------------------------------

struct Session {
    client: reqwest::Client,
    base: String,
    cookie: String,
}

impl Session {
    async fn login(
        client: reqwest::Client,
        base: &str,
        cookie_name: &str,
        username: &str,
        password: &str,
    ) -> Result<(Self, String), String> {
        let response = client
            .post(format!("{base}/login"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(|err| format!("Connection error: {err}. Please check --server."))?;

        if !response.status().is_success() {
            return Err(error_message(response).await.0);
        }

        let cookie = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .find(|pair| pair.starts_with(&format!("{cookie_name}=")))
            .map(ToOwned::to_owned)
            .ok_or_else(|| "server did not set a session cookie".to_owned())?;

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|err| format!("malformed login response: {err}"))?;

        Ok((
            Self {
                client,
                base: base.to_owned(),
                cookie,
            },
            body.user_mode,
        ))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base))
            .header(reqwest::header::COOKIE, &self.cookie)
    }

    async fn send(&self, req: reqwest::RequestBuilder, what: &str) -> Option<reqwest::Response> {
        match req.send().await {
            Ok(response) if response.status().is_success() => Some(response),
            Ok(response) => {
                let (message, _) = error_message(response).await;
                eprintln!("{}", format!("Error: {what} failed {message}").red());
                None
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {what} failed: {err}").red());
                None
            }
        }
    }

    async fn presurvey(&self) {
        let description = match prompt_line("What would you like to talk about today? ") {
            Ok(Some(value)) if !value.is_empty() => value,
            _ => return,
        };
        let keywords: Vec<String> = match prompt_line("A few keywords (comma separated): ") {
            Ok(Some(value)) => value
                .split([',', '，'])
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
            _ => Vec::new(),
        };
        if keywords.is_empty() {
            eprintln!("{}", "No keywords given; skipping the questions.".yellow());
            return;
        }

        let survey = PreSurvey {
            description,
            keywords,
        };
        self.send(self.post("/submit-pre-questions").json(&survey), "pre-survey")
            .await;
    }

    async fn turn(&self, message: &str) {
        let response = match self
            .post("/chat")
            .form(&[("message", message)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                eprintln!("{}", format!("Connection error: {err}").red());
                return;
            }
        };
        if !response.status().is_success() {
            let (message, retryable) = error_message(response).await;
            eprintln!("{}", format!("Request failed {message}").red());
            if retryable {
                eprintln!("{}", "The listener is busy; please send your message again.".yellow());
            }
            return;
        }

        let options: ReplyOptions = match response.json().await {
            Ok(options) => options,
            Err(err) => {
                eprintln!("{}", format!("Malformed reply: {err}").red());
                return;
            }
        };

        for (index, option) in options.reply_options.iter().enumerate() {
            println!("{} {}", format!("[{}]", index + 1).bold(), option.bright_green());
        }

        let Some(choice) = prompt_scale("Which reply do you prefer? [1/2]: ", 1..=2) else {
            return;
        };
        let chosen = &options.reply_options[(choice - 1) as usize];
        println!("{} {}", "Listener:".bright_green(), chosen.bright_green());
        self.send(
            self.post("/selected_response").form(&[("message", chosen.as_str())]),
            "selection",
        )
        .await;

        let response_id = options.response_id.to_string();
        if let Some(rating) = prompt_scale("Rate this reply 1-5 (Enter to skip): ", 1..=5) {
            let rating = rating.to_string();
            self.send(
                self.post("/rating").form(&[
                    ("response_id", response_id.as_str()),
                    ("rating", rating.as_str()),
                ]),
                "rating",
            )
            .await;
        }
        if let Ok(Some(feedback)) = prompt_line("Any comment on this reply? (Enter to skip): ") {
            if !feedback.is_empty() {
                self.send(
                    self.post("/feedback").form(&[
                        ("response_id", response_id.as_str()),
                        ("feedback", feedback.as_str()),
                    ]),
                    "feedback",
                )
                .await;
            }
        }
    }

    /// Post-survey on the way out; skipping any question logs out instead.
    async fn finish(&self) {
        println!("{}", "Before you go, a few questions (1-7).".bright_cyan());
        let answers = (|| {
            Some(PostSurvey {
                calm_excited: prompt_scale("Calm (1) to excited (7): ", 1..=7)?,
                unpleasant_pleasant: prompt_scale("Unpleasant (1) to pleasant (7): ", 1..=7)?,
                supportiveness: prompt_scale("How supported did you feel? ", 1..=7)?,
                engagement: prompt_scale("How engaged were you? ", 1..=7)?,
            })
        })();

        match answers {
            Some(survey) => {
                if self
                    .send(self.post("/overall_feedback").json(&survey), "survey")
                    .await
                    .is_some()
                {
                    println!("{}", "Thank you for your feedback!".bright_green());
                }
            }
            None => {
                let logout = self
                    .client
                    .get(format!("{}/logout", self.base))
                    .header(reqwest::header::COOKIE, &self.cookie);
                self.send(logout, "logout").await;
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let base = args.server.trim_end_matches('/').to_owned();

    let password = match args.password.clone() {
        Some(password) => password,
        None => match prompt_line("Password: ") {
            Ok(Some(password)) => password,
            _ => return,
        },
    };

    let (session, user_mode) = match Session::login(
        reqwest::Client::new(),
        &base,
        &args.cookie_name,
        &args.username,
        &password,
    )
    .await
    {
        Ok(result) => result,
        Err(message) => {
            eprintln!("{}", message.red());
            std::process::exit(1);
        }
    };
    println!(
        "{}",
        format!("Logged in as {} ({user_mode}). Type 'quit' to finish.", args.username)
            .bright_cyan()
    );

    if !args.skip_presurvey {
        session.presurvey().await;
    }

    loop {
        match next_step(prompt_line(&format!("{}", "You: ".bright_cyan()))) {
            Step::Send(message) => session.turn(&message).await,
            Step::Skip => continue,
            Step::Quit => break,
        }
    }

    session.finish().await;
}
