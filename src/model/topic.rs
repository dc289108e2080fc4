//! Conversation topic hierarchy
//!
//! Topics form a directed acyclic classification of conversation intents.
//! [`MessageTopic::hierarchy`] returns the precomputed transitive closure
//! (self plus all ancestors), used for fallback definition lookup in the
//! template registry and for ruleset applicability checks.

use serde::{Deserialize, Serialize};

/// The topic of a message, as produced by an upstream classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageTopic {
    /// Travel planning
    Travel,
    /// Travel planning by train
    TravelTrain,
    /// Local travel planning
    TravelLocal,
    /// Search around a location
    Perimeter,
    /// Accommodation near a location
    PerimeterAccommodation,
    /// Restaurants near a location
    PerimeterGastronomy,
    /// Activities near a location
    PerimeterActivity,
    /// Shopping and services near a location
    PerimeterShopping,
    /// Product information
    Product,
    /// Train-related products
    TrainProduct,
    /// Information about a specific train
    TrainInfo,
    /// Help with using the application itself
    ApplicationHelp,
    /// Thanks, goodbyes and other pleasantries
    Thanks,
    /// Everything else
    Other,
}

impl MessageTopic {
    /// The direct parent topic, if any
    pub fn parent(&self) -> Option<MessageTopic> {
        use MessageTopic::*;
        match self {
            TravelTrain | TravelLocal => Some(Travel),
            PerimeterAccommodation | PerimeterGastronomy | PerimeterActivity
            | PerimeterShopping => Some(Perimeter),
            TrainProduct => Some(Product),
            _ => None,
        }
    }

    /// Transitive closure over the parents, self first then nearest
    /// ancestor. The slices are precomputed; lookups never walk the graph.
    pub fn hierarchy(&self) -> &'static [MessageTopic] {
        use MessageTopic::*;
        match self {
            Travel => &[Travel],
            TravelTrain => &[TravelTrain, Travel],
            TravelLocal => &[TravelLocal, Travel],
            Perimeter => &[Perimeter],
            PerimeterAccommodation => &[PerimeterAccommodation, Perimeter],
            PerimeterGastronomy => &[PerimeterGastronomy, Perimeter],
            PerimeterActivity => &[PerimeterActivity, Perimeter],
            PerimeterShopping => &[PerimeterShopping, Perimeter],
            Product => &[Product],
            TrainProduct => &[TrainProduct, Product],
            TrainInfo => &[TrainInfo],
            ApplicationHelp => &[ApplicationHelp],
            Thanks => &[Thanks],
            Other => &[Other],
        }
    }

    /// All topics, for registry bootstrap and tests
    pub fn all() -> &'static [MessageTopic] {
        use MessageTopic::*;
        &[
            Travel,
            TravelTrain,
            TravelLocal,
            Perimeter,
            PerimeterAccommodation,
            PerimeterGastronomy,
            PerimeterActivity,
            PerimeterShopping,
            Product,
            TrainProduct,
            TrainInfo,
            ApplicationHelp,
            Thanks,
            Other,
        ]
    }
}

impl std::fmt::Display for MessageTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
