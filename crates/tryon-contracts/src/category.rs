use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse garment class sent to the synthesis backend as a body-region hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GarmentCategory {
    #[default]
    Auto,
    Tops,
    Bottoms,
    Dresses,
    Outerwear,
}

impl GarmentCategory {
    pub const ALL: [GarmentCategory; 5] = [
        GarmentCategory::Auto,
        GarmentCategory::Tops,
        GarmentCategory::Bottoms,
        GarmentCategory::Dresses,
        GarmentCategory::Outerwear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Tops => "tops",
            Self::Bottoms => "bottoms",
            Self::Dresses => "dresses",
            Self::Outerwear => "outerwear",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            Self::Auto => "The backend detects the garment type automatically.",
            Self::Tops => "T-shirts, blouses, shirts and other upper-body items.",
            Self::Bottoms => "Trousers, skirts and other lower-body items.",
            Self::Dresses => "One-piece dresses, jumpsuits and similar.",
            Self::Outerwear => "Jackets, coats, cardigans and other outer layers.",
        }
    }
}

impl fmt::Display for GarmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GarmentCategory {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown garment category '{}' (expected one of: {})",
                    raw.trim(),
                    Self::ALL
                        .iter()
                        .map(GarmentCategory::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}
