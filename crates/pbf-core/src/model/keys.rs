//! Derivación de keys durables y nombres de staging a partir de la key del
//! puntero "latest" configurada.
use chrono::{DateTime, Utc};

use crate::constants::{ARCHIVE_DATE_FORMAT, LATEST_MARKER};

fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, key),
    }
}

/// Basename de la key con la primera aparición de `-latest` eliminada.
pub fn canonical_basename(pointer_key: &str) -> String {
    let (_, base) = split_key(pointer_key);
    base.replacen(LATEST_MARKER, "", 1)
}

/// Key fechada del artifact archivado: mismo directorio que el puntero,
/// basename `{fecha}-{basename canónico}`. La fecha es la programada del run,
/// de modo que los reintentos escriben siempre la misma key.
pub fn dated_key(pointer_key: &str, scheduled_time: DateTime<Utc>) -> String {
    let date = scheduled_time.format(ARCHIVE_DATE_FORMAT);
    let name = format!("{}-{}", date, canonical_basename(pointer_key));
    match split_key(pointer_key).0 {
        Some(dir) => format!("{dir}/{name}"),
        None => name,
    }
}

/// Prefijo y sufijo para el archivo temporal de staging:
/// `region-latest.osm.pbf` -> (`region-latest.`, `.osm.pbf`).
pub fn staging_name_parts(pointer_key: &str) -> (String, String) {
    let (_, base) = split_key(pointer_key);
    match base.split_once('.') {
        Some((stem, ext)) => (format!("{stem}."), format!(".{ext}")),
        None => (format!("{base}."), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn june_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap()
    }

    #[test]
    fn dated_key_strips_latest_and_uses_scheduled_date() {
        assert_eq!(dated_key("region-latest.osm.pbf", june_first()), "2024-06-01-region.osm.pbf");
    }

    #[test]
    fn dated_key_keeps_directory_prefix() {
        assert_eq!(dated_key("osm/us-latest.osm.pbf", june_first()), "osm/2024-06-01-us.osm.pbf");
    }

    #[test]
    fn only_first_latest_marker_is_removed() {
        assert_eq!(canonical_basename("a-latest-latest.pbf"), "a-latest.pbf");
        assert_eq!(canonical_basename("plain.pbf"), "plain.pbf");
    }

    #[test]
    fn staging_parts_split_on_first_dot() {
        assert_eq!(staging_name_parts("x/us-latest.osm.pbf"),
                   ("us-latest.".to_string(), ".osm.pbf".to_string()));
        assert_eq!(staging_name_parts("blob"), ("blob.".to_string(), String::new()));
    }
}
