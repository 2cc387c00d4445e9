use std::path::PathBuf;

use clap::Parser;
use gpui::*;
use gpui_component::{Root, ThemeRegistry};

use parley::app::{NewChat, ParleyShell, Quit, SignOut, default_themes_path};
use parley::services::Services;
use parley::settings::SettingsStore;

#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Desktop client for an Nhost-hosted AI chatbot")]
struct Cli {
    /// Use the in-process backend instead of the hosted project.
    #[arg(long)]
    offline: bool,

    /// Settings file to load instead of the per-user default.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let store = match cli.config {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    let settings = store.settings();
    tracing::info!(config_path = %store.config_path().display(), "settings loaded");

    let services = if cli.offline {
        Services::offline()
    } else {
        match Services::connect(&settings) {
            Ok(services) => services,
            Err(error) => {
                tracing::warn!(%error, "hosted backend unavailable, falling back to offline mode");
                Services::offline()
            }
        }
    };

    let app = Application::new().with_assets(gpui_component_assets::Assets);

    app.run(move |cx| {
        gpui_tokio_bridge::init(cx);
        gpui_component::init(cx);

        let watched_settings = settings.clone();
        if let Err(err) = ThemeRegistry::watch_dir(default_themes_path(), cx, move |cx| {
            watched_settings.apply_theme(None, cx);
        }) {
            tracing::warn!(
                "Failed to watch themes directory: {}. Using default themes.",
                err
            );
            settings.apply_theme(None, cx);
        }

        cx.on_action(|_: &Quit, cx| {
            cx.quit();
        });

        cx.bind_keys([
            KeyBinding::new("cmd-q", Quit, None),
            KeyBinding::new("cmd-n", NewChat, None),
            KeyBinding::new("cmd-shift-q", SignOut, None),
        ]);

        cx.spawn(async move |cx| {
            cx.update(|cx| {
                let options = WindowOptions {
                    window_bounds: Some(WindowBounds::Windowed(Bounds::centered(
                        None,
                        size(px(1100.), px(760.)),
                        cx,
                    ))),
                    titlebar: Some(TitlebarOptions {
                        appears_transparent: true,
                        traffic_light_position: Some(point(px(9.), px(9.))),
                        ..Default::default()
                    }),
                    #[cfg(any(target_os = "linux", target_os = "freebsd"))]
                    window_decorations: Some(WindowDecorations::Client),
                    #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
                    window_decorations: None,
                    ..Default::default()
                };

                let opened = cx.open_window(options, |window, cx| {
                    let shell = cx.new(|cx| ParleyShell::new(services, window, cx));
                    cx.new(|cx| Root::new(shell, window, cx))
                });
                if let Err(error) = opened {
                    tracing::error!(%error, "failed to open main window");
                    cx.quit();
                    return;
                }

                cx.activate(true);
            })
        })
        .detach();
    });
}
