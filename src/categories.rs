//! The fixed, ordered category list mapped to coverage-bitmap bit
//! positions 0..15. This table MUST NOT be reordered once data exists;
//! new categories are appended.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Automotive,
    Business,
    Culture,
    Education,
    EntertainmentAndRecreation,
    Finance,
    FoodAndDrink,
    GeographicalAreas,
    Government,
    HealthAndWellness,
    Lodging,
    PlacesOfWorship,
    Services,
    Shopping,
    Sports,
    Transportation,
}

pub const ALL: [Category; 16] = [
    Category::Automotive,
    Category::Business,
    Category::Culture,
    Category::Education,
    Category::EntertainmentAndRecreation,
    Category::Finance,
    Category::FoodAndDrink,
    Category::GeographicalAreas,
    Category::Government,
    Category::HealthAndWellness,
    Category::Lodging,
    Category::PlacesOfWorship,
    Category::Services,
    Category::Shopping,
    Category::Sports,
    Category::Transportation,
];

impl Category {
    /// Stable bit position within the area's 64-bit coverage bitmap.
    pub const fn bit_index(self) -> u8 {
        match self {
            Category::Automotive => 0,
            Category::Business => 1,
            Category::Culture => 2,
            Category::Education => 3,
            Category::EntertainmentAndRecreation => 4,
            Category::Finance => 5,
            Category::FoodAndDrink => 6,
            Category::GeographicalAreas => 7,
            Category::Government => 8,
            Category::HealthAndWellness => 9,
            Category::Lodging => 10,
            Category::PlacesOfWorship => 11,
            Category::Services => 12,
            Category::Shopping => 13,
            Category::Sports => 14,
            Category::Transportation => 15,
        }
    }

    /// Google Places `includedTypes` this category expands to.
    pub fn google_included_types(self) -> &'static [&'static str] {
        match self {
            Category::Automotive => &["car_dealer", "car_repair", "gas_station", "parking"],
            Category::Business => &["corporate_office", "coworking_space"],
            Category::Culture => &["art_gallery", "museum", "cultural_center"],
            Category::Education => &["school", "university", "library"],
            Category::EntertainmentAndRecreation => &["amusement_park", "movie_theater", "park", "zoo"],
            Category::Finance => &["bank", "atm"],
            Category::FoodAndDrink => &["restaurant", "cafe", "bar", "bakery"],
            Category::GeographicalAreas => &["locality", "neighborhood"],
            Category::Government => &["city_hall", "courthouse", "embassy"],
            Category::HealthAndWellness => &["hospital", "pharmacy", "gym", "spa"],
            Category::Lodging => &["hotel", "motel", "hostel"],
            Category::PlacesOfWorship => &["church", "mosque", "synagogue", "hindu_temple"],
            Category::Services => &["laundry", "hair_salon", "plumber"],
            Category::Shopping => &["shopping_mall", "supermarket", "clothing_store"],
            Category::Sports => &["stadium", "gym", "golf_course"],
            Category::Transportation => &["bus_station", "train_station", "airport", "subway_station"],
        }
    }

    /// Equivalent OSM `amenity` values for the Overpass provider.
    pub fn osm_amenity_types(self) -> &'static [&'static str] {
        match self {
            Category::Automotive => &["car_wash", "car_rental", "fuel", "parking"],
            Category::Business => &["coworking_space"],
            Category::Culture => &["arts_centre", "theatre"],
            Category::Education => &["school", "university", "library"],
            Category::EntertainmentAndRecreation => &["cinema", "theatre"],
            Category::Finance => &["bank", "atm"],
            Category::FoodAndDrink => &["restaurant", "cafe", "bar", "fast_food"],
            Category::GeographicalAreas => &["townhall"],
            Category::Government => &["townhall", "courthouse", "embassy"],
            Category::HealthAndWellness => &["hospital", "pharmacy", "clinic"],
            Category::Lodging => &["hotel", "motel", "hostel"],
            Category::PlacesOfWorship => &["place_of_worship"],
            Category::Services => &["dry_cleaning", "hairdresser"],
            Category::Shopping => &["marketplace"],
            Category::Sports => &["stadium"],
            Category::Transportation => &["bus_station", "ferry_terminal"],
        }
    }
}

impl std::str::FromStr for Category {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
    }
}
