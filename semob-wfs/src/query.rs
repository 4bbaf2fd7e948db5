//! Construction des requêtes WFS GetFeature

use crate::MapBounds;

/// CRS dans lequel la bbox est exprimée
pub const BBOX_CRS: &str = "EPSG:4326";

/// Paramètre `bbox` au format `minX,minY,maxX,maxY,CRS`
pub fn bbox_param(bounds: &MapBounds) -> String {
    let min_x = bounds.west.min(bounds.east);
    let max_x = bounds.west.max(bounds.east);
    let min_y = bounds.south.min(bounds.north);
    let max_y = bounds.south.max(bounds.north);
    format!("{},{},{},{},{}", min_x, min_y, max_x, max_y, BBOX_CRS)
}

/// Vrai si la query string de `url` contient le paramètre `name` (insensible à la casse)
pub fn has_param(url: &str, name: &str) -> bool {
    let Some((_, query)) = url.split_once('?') else {
        return false;
    };
    query.split('&').any(|pair| {
        let key = pair.split_once('=').map_or(pair, |(k, _)| k);
        key.eq_ignore_ascii_case(name)
    })
}

/// Ajoute `name=value` à l'URL (gère `?` / `&`)
pub fn append_param(url: &str, name: &str, value: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, sep, name, value)
}

/// Ajoute `srsName=EPSG:4326` sauf si l'URL en précise déjà un
pub fn ensure_srs_name(url: &str) -> String {
    if has_param(url, "srsName") {
        url.to_string()
    } else {
        append_param(url, "srsName", BBOX_CRS)
    }
}

/// Ajoute `maxFeatures=cap` sauf si l'URL plafonne déjà
pub fn ensure_max_features(url: &str, cap: u32) -> String {
    if has_param(url, "maxFeatures") {
        url.to_string()
    } else {
        append_param(url, "maxFeatures", &cap.to_string())
    }
}

/// URL complète : base + fragment d'endpoint + bbox optionnelle
pub fn build_url(base_url: &str, endpoint: &str, bounds: Option<&MapBounds>) -> String {
    let endpoint = endpoint.trim_start_matches('?');
    let url = format!("{}?{}", base_url, endpoint);
    match bounds {
        Some(b) => ensure_srs_name(&append_param(&url, "bbox", &bbox_param(b))),
        None => url,
    }
}
