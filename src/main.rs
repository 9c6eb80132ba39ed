use eframe::egui::ViewportBuilder;
use now_playing_accent::{app::App, config::Config, logging::init_logging};
use tracing::error;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = init_logging() {
        eprintln!("Failed to initialize logging: {err:#}");
    }

    // A broken file still gets watched so fixing it takes effect live.
    let (config, config_path) = match Config::load() {
        Ok(loaded) => loaded,
        Err(err) => {
            error!(error = %format!("{err:#}"), "falling back to default config");
            (Config::default(), Config::locate())
        }
    };

    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_title("Now Playing")
            .with_inner_size(config.ui.window_size)
            .with_transparent(true),
        ..Default::default()
    };
    let run_res = eframe::run_native(
        "Now Playing",
        native_options,
        Box::new(
            move |cc| -> std::result::Result<
                Box<dyn eframe::App>,
                Box<dyn std::error::Error + Send + Sync>,
            > { Ok(Box::new(App::new(cc, config, config_path))) },
        ),
    );
    if let Err(e) = run_res {
        return Err(Box::new(e));
    }

    Ok(())
}
