use std::sync::Arc;

use tazzina::cafes::CafeStore;
use tazzina::orm::{Db, auto_migrate};
use tazzina::route;
use tazzina::router::{AppState, Request, Response, Router};
use tazzina::routes;
use tazzina::settings::Settings;
use tazzina::template;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env();
    template::set_display_logs(settings.template.debug);

    let db = Arc::new(Db::connect(&settings.database_url).await?);
    auto_migrate(db.clone()).await?;

    let mut router = Router::new();
    router.set_app_state(AppState {
        store: CafeStore::new(db.clone()),
        settings: settings.clone(),
    });
    router.add_post_middleware(Arc::new(|req: &Request, response: Response| {
        let elapsed = req.start_time.map(|t| t.elapsed()).unwrap_or_default();
        log::info!(
            "{} {} -> {} ({:.1?})",
            req.method,
            req.path,
            response.status_code,
            elapsed
        );
        response
    }));

    route!(router,
        Get "/" => { routes::home },
        Get "/add" => { routes::add },
        Post "/add" => { routes::add },
        Get "/delete/:cafe_id" => { routes::delete },
    );

    let result = router.run(settings).await;
    db.close().await;
    result
}
