use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ListwatchError;

/// Upper bound on cities per alert.
pub const MAX_ALERT_CITIES: usize = 5;

/// Upper bound on keywords per alert.
pub const MAX_ALERT_KEYWORDS: usize = 10;

// --- Categories ---

/// Section a category belongs to on the listing site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorySection {
    ForSale,
    Housing,
    Jobs,
    Services,
}

macro_rules! categories {
    ($($variant:ident => ($key:literal, $label:literal, $section:ident, $code:literal)),+ $(,)?) => {
        /// Listing category. Serialized as its kebab-case key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Category {
            $(#[serde(rename = $key)] $variant,)+
        }

        impl Category {
            pub const ALL: &'static [Category] = &[$(Category::$variant,)+];

            /// Stable key stored on alerts and matches.
            pub fn key(&self) -> &'static str {
                match self {
                    $(Category::$variant => $key,)+
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $(Category::$variant => $label,)+
                }
            }

            pub fn section(&self) -> CategorySection {
                match self {
                    $(Category::$variant => CategorySection::$section,)+
                }
            }

            /// Three-letter code used in search URLs (`/search/{code}`).
            pub fn search_code(&self) -> &'static str {
                match self {
                    $(Category::$variant => $code,)+
                }
            }
        }
    };
}

categories! {
    // For sale
    Antiques => ("antiques", "Antiques", ForSale, "ata"),
    Appliances => ("appliances", "Appliances", ForSale, "ppa"),
    ArtsCrafts => ("arts-crafts", "Arts & Crafts", ForSale, "ara"),
    AutoParts => ("auto-parts", "Auto Parts", ForSale, "pta"),
    BabyKids => ("baby-kids", "Baby & Kid", ForSale, "baa"),
    BeautyHealth => ("beauty-hlth", "Beauty & Health", ForSale, "haa"),
    Bikes => ("bikes", "Bikes", ForSale, "bia"),
    Boats => ("boats", "Boats", ForSale, "boo"),
    Books => ("books", "Books", ForSale, "bka"),
    CarsTrucks => ("cars-trucks", "Cars & Trucks", ForSale, "cta"),
    Electronics => ("electronics", "Electronics", ForSale, "ela"),
    Furniture => ("furniture", "Furniture", ForSale, "fua"),
    // Housing
    ApartmentsHousing => ("apts-housing", "Apartments & Housing", Housing, "apa"),
    Rooms => ("rooms", "Rooms & Shares", Housing, "roo"),
    Sublets => ("sublets", "Sublets & Temporary", Housing, "sub"),
    VacationRentals => ("vacation-rentals", "Vacation Rentals", Housing, "vac"),
    ParkingStorage => ("parking-storage", "Parking & Storage", Housing, "prk"),
    OfficeCommercial => ("office-commercial", "Office & Commercial", Housing, "off"),
    RealEstate => ("real-estate", "Real Estate For Sale", Housing, "rea"),
    // Jobs
    Accounting => ("accounting", "Accounting & Finance", Jobs, "acc"),
    Admin => ("admin", "Admin & Office", Jobs, "ofc"),
    ArchEngineering => ("arch-engineering", "Architect & Engineering", Jobs, "egr"),
    ArtMediaDesign => ("art-media-design", "Art & Media", Jobs, "med"),
    BiotechScience => ("biotech-science", "Biotech & Science", Jobs, "sci"),
    Business => ("business", "Business & Mgmt", Jobs, "bus"),
    CustomerService => ("customer-service", "Customer Service", Jobs, "csr"),
    Education => ("education", "Education", Jobs, "edu"),
    FoodBevHosp => ("food-bev-hosp", "Food & Hospitality", Jobs, "fbh"),
    GeneralLabor => ("general-labor", "General Labor", Jobs, "lab"),
    Government => ("government", "Government", Jobs, "gov"),
    Healthcare => ("healthcare", "Healthcare", Jobs, "hea"),
    Legal => ("legal", "Legal", Jobs, "lgl"),
    Manufacturing => ("manufacturing", "Manufacturing", Jobs, "mnu"),
    Marketing => ("marketing", "Marketing & PR", Jobs, "mar"),
    Nonprofit => ("nonprofit", "Nonprofit", Jobs, "npo"),
    RealEstateJobs => ("real-estate-jobs", "Real Estate", Jobs, "rej"),
    Retail => ("retail", "Retail", Jobs, "ret"),
    Sales => ("sales", "Sales", Jobs, "sls"),
    SalonSpaFitness => ("salon-spa-fitness", "Salon & Spa", Jobs, "spa"),
    Security => ("security", "Security", Jobs, "sec"),
    SkilledTrades => ("skilled-trades", "Skilled Trades", Jobs, "trd"),
    Software => ("software", "Software & QA", Jobs, "sof"),
    SystemsNetwork => ("systems-network", "Systems & Network", Jobs, "sad"),
    TechnicalSupport => ("technical-support", "Technical Support", Jobs, "tch"),
    Transport => ("transport", "Transport", Jobs, "trp"),
    TvFilmVideo => ("tv-film-video", "TV, Film, & Video", Jobs, "tfr"),
    WebDesign => ("web-html-info-design", "Web & Info Design", Jobs, "web"),
    WritingEditing => ("writing-editing", "Writing & Editing", Jobs, "wri"),
    // Services
    Automotive => ("automotive", "Automotive", Services, "aos"),
    Beauty => ("beauty", "Beauty", Services, "bts"),
    Computer => ("computer", "Computer", Services, "cps"),
    Creative => ("creative", "Creative", Services, "crs"),
    Event => ("event", "Event", Services, "evs"),
    Financial => ("financial", "Financial", Services, "fns"),
    LegalServices => ("legal-services", "Legal", Services, "lgs"),
    Lessons => ("lessons", "Lessons", Services, "lss"),
    Pet => ("pet", "Pet", Services, "pts"),
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl std::str::FromStr for Category {
    type Err = ListwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.key() == s)
            .ok_or_else(|| ListwatchError::Validation(format!("unknown category: {s}")))
    }
}

// --- Listings ---

/// A classified-ad record normalized from any listing source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub price: Option<String>,
    /// Post time as reported by the source (ISO-8601).
    pub datetime: String,
    pub location: String,
    pub category: Category,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A listing accepted for an alert. Unique per `(alert_id, listing.id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub alert_id: Uuid,
    #[serde(flatten)]
    pub listing: Listing,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(alert_id: Uuid, listing: Listing) -> Self {
        Self {
            alert_id,
            listing,
            created_at: Utc::now(),
        }
    }

    /// Upsert key.
    pub fn key(&self) -> (Uuid, &str) {
        (self.alert_id, self.listing.id.as_str())
    }
}

// --- Alerts ---

/// A saved search owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub cities: Vec<String>,
    pub category: Category,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub is_active: bool,
    /// Opts the alert into AI relevance scoring and spam heuristics.
    #[serde(default)]
    pub use_advanced_filter: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_count: i32,
    pub last_error: Option<String>,
}

impl Alert {
    /// Check the structural constraints the dashboard is supposed to enforce.
    pub fn validate(&self) -> Result<(), ListwatchError> {
        if self.cities.iter().all(|c| c.trim().is_empty()) {
            return Err(ListwatchError::Validation(format!(
                "alert {} has no cities",
                self.id
            )));
        }
        if self.cities.len() > MAX_ALERT_CITIES {
            return Err(ListwatchError::Validation(format!(
                "alert {} has {} cities (max {MAX_ALERT_CITIES})",
                self.id,
                self.cities.len()
            )));
        }
        if self.keywords.len() > MAX_ALERT_KEYWORDS {
            return Err(ListwatchError::Validation(format!(
                "alert {} has {} keywords (max {MAX_ALERT_KEYWORDS})",
                self.id,
                self.keywords.len()
            )));
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if max < min {
                return Err(ListwatchError::Validation(format!(
                    "alert {} has max_price {max} below min_price {min}",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Non-empty city codes, trimmed and lowercased.
    pub fn city_codes(&self) -> Vec<String> {
        self.cities
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Keywords split on whitespace and commas, empty terms dropped.
    pub fn search_terms(&self) -> Vec<String> {
        static SEPARATORS: OnceLock<Regex> = OnceLock::new();
        let separators = SEPARATORS.get_or_init(|| Regex::new(r"[\s,]+").expect("valid regex"));

        self.keywords
            .iter()
            .flat_map(|k| separators.split(k))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Status written back to an alert after each check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStatusUpdate {
    pub last_check_at: DateTime<Utc>,
    pub error_count: i32,
    pub last_error: Option<String>,
}

impl AlertStatusUpdate {
    pub fn succeeded(at: DateTime<Utc>) -> Self {
        Self {
            last_check_at: at,
            error_count: 0,
            last_error: None,
        }
    }

    pub fn failed(alert: &Alert, at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self::failed_after(alert.error_count, at, error)
    }

    /// Failure status for an alert whose previous error count is known but
    /// which could not be loaded as an [`Alert`].
    pub fn failed_after(error_count: i32, at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            last_check_at: at,
            error_count: error_count.max(0).saturating_add(1),
            last_error: Some(error.into()),
        }
    }
}
