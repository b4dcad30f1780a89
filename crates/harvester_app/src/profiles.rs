//! Built-in retailer profiles: endpoints, header/query templates and
//! selectors. These track the retailers' sites and change with them.

use std::time::Duration;

use harvester_engine::{ApiProfile, BrowserProfile, CategoryDepth, EmbeddedJsonProfile, GridProfile, RequestProfile};

pub const BUILTIN_NAMES: &[&str] = &["carrefour", "carrefour_browser", "spinneys", "choithrams"];

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "en-AE,en-GB;q=0.9,en-US;q=0.8,en;q=0.7";
const CARREFOUR_MENU_URL: &str = "https://www.carrefouruae.com/api/v1/menu";
const CARREFOUR_MENU_FILE: &str = "carrefour_menu.json";
const CARREFOUR_TOP_LEVEL: &[&str] = &[
    "F1600000", "F11600000", "F1700000", "F1500000", "F6000000", "F1610000", "F1200000", "NF3000000",
    "NF2000000", "F1000000", "NF8000000", "F1100000", "NF7000000",
];

#[derive(Debug, Clone)]
pub enum StrategyProfile {
    ApiPaginated(ApiProfile),
    EmbeddedJson {
        profile: EmbeddedJsonProfile,
        /// Pagination links on the first listing page.
        pagination_selector: String,
    },
    Browser(BrowserProfile),
}

/// Where a category-based retailer gets its category tree.
#[derive(Debug, Clone)]
pub struct MenuSource {
    pub url: &'static str,
    pub request: RequestProfile,
    pub default_file: &'static str,
    pub depth: CategoryDepth,
    pub default_top_level: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RetailerProfile {
    pub name: &'static str,
    pub request: RequestProfile,
    pub strategy: StrategyProfile,
    pub concurrency: usize,
    pub menu: Option<MenuSource>,
}

pub fn builtin(name: &str) -> Option<RetailerProfile> {
    match name {
        "carrefour" => Some(carrefour()),
        "carrefour_browser" => Some(carrefour_browser()),
        "spinneys" => Some(spinneys()),
        "choithrams" => Some(choithrams()),
        _ => None,
    }
}

fn carrefour_headers(profile: RequestProfile) -> RequestProfile {
    profile
        .header("Accept", "*/*")
        .header("Accept-Language", ACCEPT_LANGUAGE)
        .header("Appid", "Reactweb")
        .header("Credentials", "include")
        .header("Env", "prod")
        .header("Intent", "STANDARD")
        .header("Referer", "https://www.carrefouruae.com")
        .header("Sec-Ch-Ua-Mobile", "?0")
        .header("Sec-Ch-Ua-Platform", "\"Windows\"")
        .header("Sec-Fetch-Dest", "empty")
        .header("Sec-Fetch-Mode", "cors")
        .header("Sec-Fetch-Site", "same-origin")
        .header("Storeid", "mafuae")
        .header("User-Agent", CHROME_UA)
}

fn carrefour_menu(depth: CategoryDepth) -> MenuSource {
    MenuSource {
        url: CARREFOUR_MENU_URL,
        request: carrefour_headers(RequestProfile::new())
            .header("Userid", "anonymous")
            .query("latitude", "25.2321031")
            .query("longitude", "55.2772914")
            .query("lang", "en")
            .query("displayCurr", "AED"),
        default_file: CARREFOUR_MENU_FILE,
        depth,
        default_top_level: CARREFOUR_TOP_LEVEL.iter().map(|id| id.to_string()).collect(),
    }
}

fn carrefour() -> RetailerProfile {
    let request = carrefour_headers(RequestProfile::new())
        .query("filter", "")
        .query("sortBy", "relevance")
        .query("currentPage", "0")
        .query("pageSize", "60")
        .query("maxPrice", "")
        .query("minPrice", "")
        .query("areaCode", "DubaiFestivalCity-Dubai")
        .query("lang", "en")
        .query("displayCurr", "AED")
        .query("latitude", "25.2107038")
        .query("longitude", "55.2755447")
        .query("needVariantsData", "true")
        .query("nextOffset", "")
        .query("requireSponsProducts", "true")
        .query("responseWithCatTree", "true")
        .query("depth", "3");

    RetailerProfile {
        name: "carrefour",
        request,
        strategy: StrategyProfile::ApiPaginated(ApiProfile {
            endpoint: "https://www.carrefouruae.com/api/v8/categories/{category}".to_string(),
            page_param: "currentPage".to_string(),
            first_page: 0,
            records_key: "products".to_string(),
            page_count_key: "numOfPages".to_string(),
            max_pages: 200,
        }),
        concurrency: 10,
        menu: Some(carrefour_menu(CategoryDepth::L3)),
    }
}

fn carrefour_browser() -> RetailerProfile {
    RetailerProfile {
        name: "carrefour_browser",
        request: RequestProfile::new(),
        strategy: StrategyProfile::Browser(BrowserProfile {
            page_url: "https://www.carrefouruae.com/mafuae/en/c/{category}".to_string(),
            api_path: "/api/v8/categories/{category}".to_string(),
            consent_selector: Some("#onetrust-accept-btn-handler".to_string()),
            load_more_selector: ".css-10s9ah".to_string(),
            exhausted_selector: None,
            initial_state_selector: r#"script[type="application/json"]"#.to_string(),
            initial_state_path: ["props", "initialState", "search", "products"]
                .into_iter()
                .map(String::from)
                .collect(),
            batch_records_key: "products".to_string(),
            wait: Duration::from_secs(10),
            settle: Duration::from_secs(1),
            max_batches: 500,
        }),
        concurrency: 2,
        menu: Some(carrefour_menu(CategoryDepth::L2)),
    }
}

fn listing_headers() -> RequestProfile {
    RequestProfile::new()
        .header("Accept", "*/*")
        .header("Accept-Language", ACCEPT_LANGUAGE)
        .header("User-Agent", CHROME_UA)
}

fn spinneys() -> RetailerProfile {
    RetailerProfile {
        name: "spinneys",
        request: listing_headers(),
        strategy: StrategyProfile::EmbeddedJson {
            profile: EmbeddedJsonProfile {
                listing_url: "https://www.spinneys.com/en-ae/catalogue/".to_string(),
                page_param: "page".to_string(),
                marker: "impressions".to_string(),
                anchor: r"dataLayer\.push\(".to_string(),
                items_path: vec!["ecommerce".to_string(), "impressions".to_string()],
                grid: Some(GridProfile::new(
                    "div.arc-grid div.js-product-wrapper.product-bx",
                    "div.product-info p.product-name a",
                    "div.product-info p.product-price span.price",
                    "div.product-info p.product-price span.quantity",
                )),
                script_key: None,
            },
            pagination_selector: "div.page-numbers a".to_string(),
        },
        concurrency: 5,
        menu: None,
    }
}

fn choithrams() -> RetailerProfile {
    RetailerProfile {
        name: "choithrams",
        request: listing_headers(),
        strategy: StrategyProfile::EmbeddedJson {
            profile: EmbeddedJsonProfile {
                listing_url: "https://www.choithrams.com/en/catalogue/".to_string(),
                page_param: "page".to_string(),
                marker: "view_item_list".to_string(),
                anchor: "\"ecommerce\":".to_string(),
                items_path: vec!["items".to_string()],
                grid: None,
                script_key: None,
            },
            pagination_selector: "div.page-buttons a".to_string(),
        },
        concurrency: 7,
        menu: None,
    }
}
