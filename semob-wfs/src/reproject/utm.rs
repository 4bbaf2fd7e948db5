//! Projection UTM (Universal Transverse Mercator), sens inverse
//!
//! Zone utilisée par le geoserver SEMOB :
//! - Zone 23S (EPSG:31983, SIRGAS 2000) - Distrito Federal

use super::ellipsoid::GRS80;
use super::Geographic;

/// Facteur d'échelle sur le méridien central
pub const K0: f64 = 0.9996;

/// False easting commun à toutes les zones
pub const FALSE_EASTING: f64 = 500_000.0;

/// False northing de l'hémisphère sud
pub const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Paramètres d'une zone UTM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    pub number: u32,
    pub south: bool,
}

impl UtmZone {
    /// SIRGAS 2000 / UTM zone 23S
    pub const ZONE_23S: UtmZone = UtmZone {
        number: 23,
        south: true,
    };

    /// Longitude du méridien central en degrés (-45° pour la zone 23)
    pub fn central_meridian_deg(&self) -> f64 {
        (self.number as f64 - 1.0) * 6.0 - 180.0 + 3.0
    }

    pub fn false_northing(&self) -> f64 {
        if self.south {
            FALSE_NORTHING_SOUTH
        } else {
            0.0
        }
    }
}

/// Convertit UTM vers coordonnées géographiques (GRS80)
///
/// Séries de Snyder à partir de la latitude "footprint" ; précision
/// sub-millimétrique dans la bande des ±3° autour du méridien central.
pub fn utm_to_geographic(x: f64, y: f64, zone: UtmZone) -> Geographic {
    let a = GRS80::A;
    let e2 = GRS80::E2;
    let ep2 = GRS80::EP2;

    let lon0 = zone.central_meridian_deg().to_radians();

    // Coordonnées réduites
    let x = x - FALSE_EASTING;
    let y = y - zone.false_northing();

    // Calcul du footprint latitude
    let m = y / K0;
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

    // Coefficients pour la série
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let n1 = a / (1.0 - e2 * sin_phi1.powi(2)).sqrt();
    let t1 = tan_phi1.powi(2);
    let c1 = ep2 * cos_phi1.powi(2);
    let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_phi1.powi(2)).powf(1.5);
    let d = x / (n1 * K0);

    // Latitude
    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2) - 252.0 * ep2 - 3.0 * c1.powi(2))
                    * d.powi(6)
                    / 720.0);

    // Longitude
    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
                * d.powi(5)
                / 120.0)
            / cos_phi1;

    Geographic::new(lon, lat)
}
