use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cachelens::api::{CARS_PATH, Origin};
use cachelens::cache::CachingClient;
use cachelens::client::{HttpClient, Transport};
use cachelens::config::Config;
use cachelens::console::{
    CommandLoop, EndpointResolver, KeySource, LastIdResolver, ScriptedKeys, StdinKeys,
};
use cachelens::store::CarRepository;

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // Logs go to stderr so they never interleave with the tables on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn session<T, R, K, W>(transport: T, resolver: R, keys: K, out: W) -> io::Result<W>
where
    T: Transport,
    R: LastIdResolver,
    K: KeySource,
    W: Write,
{
    let mut console = CommandLoop::new(transport, resolver, keys, out);
    console.run().await?;
    Ok(console.into_output())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    config.validate()?;
    init_tracing(&config.log);

    let (addr, origin) = match &config.remote {
        Some(remote) => (remote.clone(), None),
        None => {
            let repo = Arc::new(CarRepository::new(config.last));
            for _ in 0..config.seed_count() {
                repo.create();
            }
            let origin = Origin::start(&config.bind, repo, config.cache_policy()).await?;
            (origin.local_addr().to_string(), Some(origin))
        }
    };
    info!(origin = %addr, embedded = origin.is_some(), "starting session");

    let http = HttpClient::new(addr, config.timeout())?;
    let cached = CachingClient::new(http.clone(), config.cache_capacity).invalidating(CARS_PATH);
    let resolver = EndpointResolver::new(http);

    match &config.script {
        Some(script) => {
            session(&cached, resolver, ScriptedKeys::new(script), io::stdout()).await?;
        }
        None => {
            session(&cached, resolver, StdinKeys::new(), io::stdout()).await?;
        }
    }

    let stats = cached.stats();
    info!(
        hits = stats.hits(),
        misses = stats.misses(),
        revalidations = stats.revalidations(),
        passthroughs = stats.passthroughs(),
        "client cache totals"
    );

    if let Some(origin) = origin {
        origin.stop().await?;
    }
    Ok(())
}
