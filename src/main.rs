use anyhow::Result;
use serenity::{
    http::Http,
    model::{gateway::GatewayIntents, id::ApplicationId},
    Client,
};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use jukebox::{
    audio::{
        player::{PlayerDeps, PlayerOptions},
        registry::PlayerRegistry,
    },
    bot::{voice::SongbirdSink, JukeboxBot},
    config::Config,
    sources::YtDlpClient,
    storage::{GuildSettings, JsonStorage},
    ui::ChannelNotifier,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    let defaults = GuildSettings {
        volume: config.default_volume,
        ..GuildSettings::default()
    };

    // Inicializar almacenamiento JSON
    let storage = Arc::new(
        JsonStorage::new(config.data_dir.clone())
            .await?
            .with_defaults(defaults),
    );

    let ytdlp = Arc::new(YtDlpClient::new(&config));
    let http = Arc::new(Http::new(&config.discord_token));
    let notifier = Arc::new(ChannelNotifier::new(http));
    let songbird = Songbird::serenity();

    let deps = PlayerDeps {
        resolver: ytdlp.clone(),
        autoplay: ytdlp.clone(),
        sink: Arc::new(SongbirdSink::new(songbird.clone(), reqwest::Client::new())),
        store: storage,
        notifier: notifier.clone(),
    };
    let options = PlayerOptions {
        max_queue_size: config.max_queue_size,
        autoplay_attempts: config.autoplay_attempts,
        shuffle_seed: None,
    };
    let registry = Arc::new(PlayerRegistry::new(deps, options, defaults));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    // Crear handler del bot
    let handler = JukeboxBot::new(config.clone(), registry.clone(), ytdlp, notifier);

    // Construir cliente
    let mut builder = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird);
    if config.application_id != 0 {
        builder = builder.application_id(ApplicationId::new(config.application_id));
    }
    let mut client = builder.await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        for guild_id in registry.guilds() {
            registry.reset(guild_id).await;
        }
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes: {}", config.ytdlp_path);
    }
}
