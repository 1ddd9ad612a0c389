//! Places providers: the client seam, the Google Places implementation,
//! and the built-in cuisine keyword dataset.

use super::types::{NearbySearchRequest, PlaceResult, PlacesError, SearchTerm};
use serde::Deserialize;
use std::time::Duration;

/// The external nearby-search service.
///
/// Implementations block the calling thread; callers run them on worker threads.
pub trait PlacesSearchClient: Send + Sync {
    fn nearby_search(&self, request: &NearbySearchRequest) -> Result<Vec<PlaceResult>, PlacesError>;

    /// Build a photo URL for an opaque reference. Pure string construction.
    fn photo_url(&self, reference: &str, max_width: u32) -> String;
}

// ─── Built-in cuisine dataset ───────────────────────────────────

struct CuisineKeywords {
    cuisine: &'static str,
    primary: &'static str,
    names: &'static [&'static str],
}

const CUISINES: &[CuisineKeywords] = &[
    CuisineKeywords {
        cuisine: "中式料理",
        primary: "中式料理 OR 中餐",
        names: &["中餐廳", "中華料理", "小籠包", "炒飯", "餃子", "燒臘", "粵菜", "川菜", "湘菜", "上海菜"],
    },
    CuisineKeywords {
        cuisine: "日式料理",
        primary: "日式料理 OR 日本料理",
        names: &["壽司", "拉麵", "居酒屋", "丼飯", "生魚片", "串燒", "天婦羅", "日本料理", "炸豬排", "燒肉"],
    },
    CuisineKeywords {
        cuisine: "義式料理",
        primary: "義式料理 OR 義大利料理",
        names: &["義大利麵", "披薩", "pasta", "pizza", "義大利餐廳", "焗烤", "帕尼尼", "燉飯", "提拉米蘇", "義式"],
    },
    CuisineKeywords {
        cuisine: "韓式料理",
        primary: "韓式料理 OR 韓國料理",
        names: &["韓國", "韓式", "韓式炸雞", "韓式烤肉", "石鍋拌飯", "部隊鍋", "泡菜", "辣炒年糕", "人蔘雞", "冷麵"],
    },
    CuisineKeywords {
        cuisine: "美式料理",
        primary: "美式料理 OR 美國料理",
        names: &["漢堡", "牛排", "美式", "三明治", "炸雞", "美國餐廳", "牛肉", "BBQ", "披薩", "薯條"],
    },
    CuisineKeywords {
        cuisine: "泰式料理",
        primary: "泰式料理 OR 泰國料理",
        names: &["泰國", "泰式", "酸辣", "打拋", "綠咖哩", "冬陰功", "泰式炒河粉", "椰奶", "芒果糯米飯", "泰國菜"],
    },
    CuisineKeywords {
        cuisine: "早午餐",
        primary: "早午餐 OR brunch",
        names: &["早餐", "brunch", "班尼迪克蛋", "鬆餅", "吐司", "歐姆蛋", "法式吐司", "松餅", "三明治", "咖啡"],
    },
    CuisineKeywords {
        cuisine: "海鮮料理",
        primary: "海鮮料理 OR 海鮮",
        names: &["海鮮", "生魚片", "烤魚", "蝦子", "龍蝦", "螃蟹", "鮭魚", "鮪魚", "貝類", "海鮮餐廳"],
    },
    CuisineKeywords {
        cuisine: "牛排",
        primary: "牛排 OR steak",
        names: &["牛排館", "排餐", "steakhouse", "肋眼", "菲力", "沙朗", "丁骨", "肉眼", "牛小排", "鐵板燒"],
    },
    CuisineKeywords {
        cuisine: "火鍋",
        primary: "火鍋 OR 鍋",
        names: &["麻辣鍋", "涮涮鍋", "石頭鍋", "小火鍋", "鴛鴦鍋", "羊肉爐", "薑母鴨", "沙茶鍋", "海鮮鍋", "泡菜鍋"],
    },
    CuisineKeywords {
        cuisine: "甜點",
        primary: "甜點 OR 蛋糕",
        names: &["蛋糕", "甜點店", "冰淇淋", "巧克力", "糕點", "烘焙", "馬卡龍", "塔", "派", "奶酪"],
    },
    CuisineKeywords {
        cuisine: "咖啡廳",
        primary: "咖啡廳 OR 咖啡",
        names: &["咖啡", "coffee", "cafe", "下午茶", "拿鐵", "咖啡店", "espresso", "卡布奇諾", "蛋糕", "甜點"],
    },
];

fn lookup(cuisine: &str) -> Option<&'static CuisineKeywords> {
    CUISINES.iter().find(|c| c.cuisine == cuisine)
}

/// The primary search term for a cuisine type.
///
/// Empty cuisine falls back to the generic restaurant category; unknown
/// cuisines are searched verbatim as a keyword.
pub fn primary_term(cuisine: &str) -> SearchTerm {
    if cuisine.is_empty() {
        return SearchTerm::restaurant();
    }
    let keyword = lookup(cuisine).map(|c| c.primary).unwrap_or(cuisine);
    SearchTerm::Keyword(keyword.to_string())
}

/// Alternate name keywords used to top up sparse results.
pub fn name_keywords(cuisine: &str) -> &'static [&'static str] {
    lookup(cuisine).map(|c| c.names).unwrap_or(&[])
}

/// Cuisine types with a tuned keyword set (for clients building a picker).
pub fn known_cuisines() -> Vec<&'static str> {
    CUISINES.iter().map(|c| c.cuisine).collect()
}

// ─── Google Places provider ─────────────────────────────────────

const NEARBY_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";
const PHOTO_URL: &str = "https://maps.googleapis.com/maps/api/place/photo";

#[derive(Deserialize)]
struct NearbySearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceResult>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Blocking Google Places client.
pub struct GooglePlacesClient {
    agent: ureq::Agent,
    api_key: String,
}

impl GooglePlacesClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("what2eat/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            api_key: api_key.into(),
        }
    }
}

impl PlacesSearchClient for GooglePlacesClient {
    fn nearby_search(&self, request: &NearbySearchRequest) -> Result<Vec<PlaceResult>, PlacesError> {
        let location = format!("{},{}", request.lat, request.lng);
        let (term_key, term_value) = match &request.term {
            SearchTerm::Keyword(k) => ("keyword", k.as_str()),
            SearchTerm::Category(c) => ("type", c.as_str()),
            SearchTerm::Name(n) => ("name", n.as_str()),
        };

        let response = self
            .agent
            .get(NEARBY_SEARCH_URL)
            .query("location", &location)
            .query("rankby", request.rank_by.as_param())
            .query("language", &request.language)
            .query(term_key, term_value)
            .query("key", &self.api_key)
            .call()
            .map_err(|e| PlacesError::Network(e.to_string()))?;

        let body: NearbySearchResponse = response
            .into_json()
            .map_err(|e| PlacesError::InvalidResponse(e.to_string()))?;

        interpret_status(body)
    }

    fn photo_url(&self, reference: &str, max_width: u32) -> String {
        format!(
            "{}?maxwidth={}&photoreference={}&key={}",
            PHOTO_URL, max_width, reference, self.api_key
        )
    }
}

fn interpret_status(body: NearbySearchResponse) -> Result<Vec<PlaceResult>, PlacesError> {
    let NearbySearchResponse { status, results, error_message } = body;
    let detail = error_message.unwrap_or_else(|| status.clone());
    match status.as_str() {
        "OK" | "ZERO_RESULTS" => Ok(results),
        "OVER_QUERY_LIMIT" => Err(PlacesError::QuotaExhausted(detail)),
        "REQUEST_DENIED" | "INVALID_REQUEST" => Err(PlacesError::Denied(detail)),
        _ => Err(PlacesError::InvalidResponse(detail)),
    }
}
