//! Accès typé aux propriétés des features
//!
//! Le geoserver n'est pas constant sur le nom des attributs : chaque champ
//! d'entité est résolu en essayant une liste ordonnée de clés candidates.
//! La première valeur non vide l'emporte.

use serde_json::Value;

/// Propriétés brutes d'une feature
pub type Properties = serde_json::Map<String, Value>;

/// Valeurs que l'amont utilise pour dire "pas de valeur"
pub const SENTINELS: &[&str] = &["NULL", "N/A"];

/// Clés candidates pour les positions de la frota
pub mod bus {
    pub const LINE: &[&str] = &["cd_linha", "linha", "servico"];
    pub const PREFIX: &[&str] = &["prefixo"];
    pub const SPEED: &[&str] = &["velocidade"];
    pub const DIRECTION: &[&str] = &["sentido"];
    pub const TIMESTAMP: &[&str] = &["datalocal"];
    pub const FARE: &[&str] = &["tarifa", "vl_tarifa", "valor_tarifa", "preco", "valor"];
}

/// Clés du cadastre de la frota (véhicule → operadora)
pub mod fleet {
    pub const VEHICLE: &[&str] = &["numero_veiculo"];
    pub const OPERATOR: &[&str] = &["operadora"];
    pub const SERVICE: &[&str] = &["servico"];
    pub const BUS_TYPE: &[&str] = &["tipo_onibus"];
    pub const REFERENCE_DATE: &[&str] = &["data_referencia"];
}

/// Clés candidates pour les paradas
pub mod stop {
    pub const CODE: &[&str] = &["parada", "cd_parada", "codigo", "id", "id_parada"];
    pub const NAME: &[&str] = &["descricao", "ds_ponto", "nm_parada", "nome", "ds_descricao"];
    pub const STATUS: &[&str] = &["ativa", "ativo", "st_ativa", "status", "situacao"];

    pub const DEFAULT_NAME: &str = "Parada de ônibus";
}

/// Clés candidates pour les linhas
pub mod line {
    pub const CODE: &[&str] = &["cd_linha", "linha", "servico", "codigo", "cod_linha"];
    /// Clés comparées lors de la recherche d'un tracé par code
    pub const MATCH: &[&str] = &[
        "cd_linha",
        "linha",
        "servico",
        "cd_linha_principal",
        "codigo",
        "cod_linha",
    ];
    pub const SERVICE: &[&str] = &["servico"];
    pub const FARE: &[&str] = &["tarifa", "vl_tarifa", "valor_tarifa", "preco", "valor"];
}

/// Rend une valeur scalaire sous forme de texte (trim), `None` si vide
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Première valeur texte non vide parmi les candidates
pub fn pick_str(props: &Properties, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .find_map(|key| props.get(*key).and_then(scalar_text))
}

/// Comme `pick_str` avec une valeur par défaut
pub fn pick_str_or(props: &Properties, candidates: &[&str], default: &str) -> String {
    pick_str(props, candidates).unwrap_or_else(|| default.to_string())
}

/// Comme `pick_str` mais ignore aussi les sentinelles ("NULL", "N/A")
pub fn pick_meaningful(props: &Properties, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|key| {
        props
            .get(*key)
            .and_then(scalar_text)
            .filter(|v| !is_sentinel(v))
    })
}

/// Première valeur numérique ; accepte la virgule décimale ("12,5")
pub fn pick_f64(props: &Properties, candidates: &[&str]) -> Option<f64> {
    candidates.iter().find_map(|key| match props.get(*key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_decimal(s),
        _ => None,
    })
}

/// Parse un nombre texte, virgule ou point décimal
pub fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn is_sentinel(value: &str) -> bool {
    let upper = value.trim().to_uppercase();
    SENTINELS.iter().any(|s| *s == upper)
}

/// Toutes les valeurs non vides des candidates, dans l'ordre, sans doublon
pub fn collect_str(props: &Properties, candidates: &[&str]) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for key in candidates {
        if let Some(v) = props.get(*key).and_then(scalar_text) {
            if !values.contains(&v) {
                values.push(v);
            }
        }
    }
    values
}
