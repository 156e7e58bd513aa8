use super::types::EditSetOrigin;

pub const REPAIRED_BANNER: &str =
    "ℹ️ JSON reconstruido automáticamente a partir del borrador del modelo.\n\n";

pub const FALLBACK_BANNER: &str = "⚠️ El modelo no devolvió JSON; se muestra la plantilla sin cambios. \
Reintenta con otra imagen o ajusta el prompt.\n\n";

/// Banner prefixed to a report, selected by where its edit set came from.
pub fn banner_for(origin: EditSetOrigin) -> Option<&'static str> {
    match origin {
        EditSetOrigin::ModelDirect => None,
        EditSetOrigin::Repaired => Some(REPAIRED_BANNER),
        EditSetOrigin::FallbackSkeleton => Some(FALLBACK_BANNER),
    }
}

/// `report` with the origin's banner, if any, in front.
pub fn with_banner(origin: EditSetOrigin, report: String) -> String {
    match banner_for(origin) {
        Some(banner) => format!("{banner}{report}"),
        None => report,
    }
}
