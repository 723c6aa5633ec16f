//! Coordinate Reference System tag
//!
//! The engine never reprojects. The CRS travels from the raster source to
//! every vertex it emits so downstream consumers know what the coordinates
//! mean.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// WKT representation
    wkt: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Geographic (degree-based) CRS codes. Areas and lengths computed on such
    /// grids are in square degrees and degrees, which callers must know.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(4326) | Some(4269) | Some(4258))
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            let head: String = wkt.chars().take(50).collect();
            return format!("WKT:{}", head);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_identifier() {
        assert_eq!(CRS::from_epsg(32719).identifier(), "EPSG:32719");
        assert!(CRS::from_wkt("LOCAL_CS[\"grid\"]").identifier().starts_with("WKT:"));
    }

    #[test]
    fn test_crs_identifier_truncates_on_char_boundary() {
        // 'é' straddles byte 50
        let wkt = format!("{}é{}", "P".repeat(49), "Q".repeat(10));
        let id = CRS::from_wkt(wkt).identifier();
        assert_eq!(id, format!("WKT:{}é", "P".repeat(49)));
        assert_eq!(id.chars().count(), 54);
    }

    #[test]
    fn test_crs_geographic() {
        assert!(CRS::from_epsg(4326).is_geographic());
        assert!(!CRS::from_epsg(32719).is_geographic());
    }
}
