// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pixgram` subcommands.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use crate::auth::AuthService;
use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::credential::inspect;
use crate::credential::wire::SignupForm;
use crate::error::ApiError;
use crate::events::LogNavigator;
use crate::transport::{ApiRequest, Method};

#[derive(Parser)]
#[command(name = "pixgram", version, about = "Command-line client for the pixgram API")]
pub struct CliArgs {
    #[command(flatten)]
    pub config: ClientConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PIXGRAM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "PIXGRAM_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user and credential expiry
    Whoami,
    /// GET an API path and print the JSON response
    Get { path: String },
    /// POST a JSON body to an API path and print the JSON response
    Post {
        path: String,
        /// Request body (JSON).
        #[arg(default_value = "{}")]
        body: String,
    },
    /// Keep the session alive and print credential events until interrupted
    Watch,
}

pub async fn run(args: CliArgs) -> i32 {
    let navigator = Arc::new(LogNavigator::default());
    let client = Arc::new(ApiClient::from_config(&args.config, navigator));
    let auth = AuthService::new(Arc::clone(&client));

    let code = match args.command {
        Command::Login { email, password } => match auth.login(&email, &password).await {
            Ok(user) => {
                println!("Signed in as {}", user.display_name());
                0
            }
            Err(e) => report(&e),
        },

        Command::Signup { username, email, password, full_name } => {
            let form = SignupForm { username, email, password, full_name };
            match auth.signup(&form).await {
                Ok(user) => {
                    println!("Welcome, {}!", user.display_name());
                    0
                }
                Err(e) => report(&e),
            }
        }

        Command::Logout => match auth.logout().await {
            Ok(()) => {
                println!("Signed out");
                0
            }
            Err(e) => {
                println!("Signed out locally");
                report(&e)
            }
        },

        Command::Whoami => whoami(&auth),

        Command::Get { path } => {
            auth.initialize();
            print_response(client.send(ApiRequest::get(path)).await)
        }

        Command::Post { path, body } => {
            let body: serde_json::Value = match serde_json::from_str(&body) {
                Ok(body) => body,
                Err(e) => {
                    eprintln!("error: body is not valid JSON: {e}");
                    return 2;
                }
            };
            auth.initialize();
            print_response(client.send(ApiRequest::new(Method::Post, path).with_body(body)).await)
        }

        Command::Watch => watch(&auth).await,
    };

    client.coordinator().destroy();
    code
}

fn report(e: &ApiError) -> i32 {
    eprintln!("error: {e}");
    1
}

fn whoami(auth: &AuthService) -> i32 {
    if !auth.initialize() {
        eprintln!("not signed in");
        return 1;
    }
    let Some(session) = auth.client().coordinator().session() else {
        eprintln!("not signed in");
        return 1;
    };
    let now = auth.client().coordinator().now_secs() as i64;
    let user = &session.user;

    println!("{} ({})", user.display_name(), user.id);
    if let Some(email) = &user.email {
        println!("  email:   {email}");
    }
    for (label, token) in [("access", &session.access_token), ("refresh", &session.refresh_token)] {
        let remaining = inspect::expiry_time(Some(token)) - now;
        if remaining < 0 {
            println!("  {label}:  expired");
        } else {
            println!("  {label}:  expires in {}m {:02}s", remaining / 60, remaining % 60);
        }
    }
    0
}

fn print_response(result: Result<crate::transport::ApiResponse, ApiError>) -> i32 {
    match result {
        Ok(resp) => {
            match serde_json::to_string_pretty(&resp.body) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{}", resp.body),
            }
            0
        }
        Err(e) => report(&e),
    }
}

async fn watch(auth: &AuthService) -> i32 {
    let coordinator = Arc::clone(auth.client().coordinator());
    let mut events = coordinator.subscribe();
    if !auth.initialize() {
        eprintln!("not signed in");
        return 1;
    }
    println!("Watching session (press Ctrl+C to stop)");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Ok(line) = serde_json::to_string(&event) {
                        println!("{line}");
                    }
                    if matches!(event, crate::events::CredentialEvent::SessionExpired { .. }) {
                        return 1;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return 1,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT");
                return 0;
            }
        }
    }
}
