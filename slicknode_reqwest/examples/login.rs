use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use slicknode_auth::{
    document::{Directive, Field, OperationDefinition, OperationKind},
    operation::{Forward, Operation},
    AuthLink, LinkOptions, StorageOptions,
};
use slicknode_reqwest::HttpForward;

#[derive(Debug, Parser)]
struct Opts {
    /// The Slicknode API endpoint
    #[clap(short, long, env)]
    endpoint: reqwest::Url,

    /// The email address to log in with
    #[clap(long, env)]
    email: String,

    /// The password to log in with
    #[clap(long, env, hide_env_values = true)]
    password: String,

    /// The local file used to persist credentials
    #[clap(short = 'f', long, env, default_value = ".slicknode-auth.json")]
    credentials_file: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let link = AuthLink::from_options(LinkOptions {
        storage: StorageOptions::File {
            path: opts.credentials_file,
        },
        debug: true,
        ..LinkOptions::default()
    });
    let forward: Arc<dyn Forward> = Arc::new(HttpForward::from_client(
        reqwest::Client::new(),
        opts.endpoint,
    ));

    if !link.has_refresh_token()? {
        let login = Operation::new(
            OperationDefinition::new(OperationKind::Mutation)
                .with_name("Login")
                .with_variable_definitions("$email: String!, $password: String!")
                .with_selection(
                    Field::new("loginEmailPassword")
                        .with_arguments("input: {email: $email, password: $password}")
                        .with_directive(Directive::new("authenticate"))
                        .with_selection(Field::new("accessToken"))
                        .with_selection(Field::new("refreshToken"))
                        .with_selection(Field::new("accessTokenLifetime"))
                        .with_selection(Field::new("refreshTokenLifetime")),
                ),
        )
        .with_operation_name("Login")
        .with_variable("email", opts.email)
        .with_variable("password", opts.password);

        let mut responses = link.request(login, Some(forward.clone()))?;
        while let Some(response) = responses.next().await {
            let response = response?;
            if !response.errors.is_empty() {
                tracing::warn!(errors = ?response.errors, "login failed");
            }
        }
    }

    tracing::info!(
        access_token = link.has_access_token()?,
        refresh_token = link.has_refresh_token()?,
        "credentials after login"
    );

    let viewer = Operation::new(
        OperationDefinition::new(OperationKind::Query)
            .with_name("Viewer")
            .with_selection(
                Field::new("viewer").with_selection(
                    Field::new("user")
                        .with_selection(Field::new("id"))
                        .with_selection(Field::new("email")),
                ),
            ),
    );

    let mut responses = link.request(viewer, Some(forward))?;
    while let Some(response) = responses.next().await {
        let response = response?;
        tracing::info!(data = ?response.data, "viewer");
    }

    Ok(())
}
