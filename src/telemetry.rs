//! Inicialização do logging estruturado.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Instala o subscriber global. Chamadas repetidas são no-ops.
///
/// `RUST_LOG` tem precedência; sem ele o nível é `info`, ou `debug` com `verbose`.
/// Os logs vão para stderr, deixando stdout para o progresso e os relatórios.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let default = if verbose { "copyforge=debug" } else { "copyforge=info" };
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(verbose)
                    .with_writer(std::io::stderr),
            )
            .init();
    });
}
