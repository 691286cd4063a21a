//! Built-in assistant tools: current date/time and order tracking.

use async_trait::async_trait;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::{Value, json};
use time::{Date, Duration, OffsetDateTime};
use time_tz::{OffsetDateTimeExt, timezones};
use xxhash_rust::xxh3::xxh3_64;

use super::{ToolDeclaration, ToolRegistry, ToolRegistryError, TypedTool};

pub const DATE_TIME_TOOL: &str = "getDateAndTimeTool";
pub const TRACK_ORDER_TOOL: &str = "trackOrderTool";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly AI assistant. You can help with:
- Getting the current date and time
- Tracking the status of an order
- General conversation and assistance

When reading order numbers, read each digit individually with a short pause between them. \
For example, order #1234 is read as 'order number one-two-three-four', \
not 'order number one thousand two hundred thirty-four'.

Keep your responses conversational and helpful.";

/// Label reported for Pacific time, daylight saving or not.
const TIMEZONE_LABEL: &str = "PST";

const ORDER_STATUSES: [(&str, u32); 8] = [
    ("Order received", 10),
    ("Processing", 15),
    ("Preparing for shipment", 15),
    ("Shipped", 20),
    ("In transit", 20),
    ("Out for delivery", 10),
    ("Delivered", 5),
    ("Delayed", 3),
];

pub fn date_time_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        DATE_TIME_TOOL,
        "Get information about the current date and time",
    )
}

pub fn track_order_declaration() -> ToolDeclaration {
    ToolDeclaration::new(
        TRACK_ORDER_TOOL,
        "Retrieves real-time order tracking information and detailed status updates for customer orders by order ID",
    )
    .param(
        "orderId",
        json!({"type": "string", "description": "The order number or ID to track"}),
        true,
    )
    .param(
        "requestNotifications",
        json!({
            "type": "boolean",
            "description": "Whether to set up notifications for this order",
            "default": false
        }),
        false,
    )
}

/// Registry with both built-in tools.
pub fn default_registry() -> Result<ToolRegistry, ToolRegistryError> {
    ToolRegistry::builder()
        .tool(date_time_declaration(), DateTimeTool)
        .tool(track_order_declaration(), TrackOrderTool)
        .build()
}

#[derive(Debug, Deserialize)]
pub struct NoArgs {}

pub struct DateTimeTool;

#[async_trait]
impl TypedTool for DateTimeTool {
    type Args = NoArgs;
    type Output = Value;

    async fn call(&self, _args: NoArgs) -> Result<Value, String> {
        Ok(date_time_payload(pacific_time(OffsetDateTime::now_utc())))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackOrderArgs {
    pub order_id: String,
    #[serde(default)]
    pub request_notifications: bool,
}

pub struct TrackOrderTool;

#[async_trait]
impl TypedTool for TrackOrderTool {
    type Args = TrackOrderArgs;
    type Output = Value;

    async fn call(&self, args: TrackOrderArgs) -> Result<Value, String> {
        let today = pacific_time(OffsetDateTime::now_utc()).date();
        track_order(&args.order_id, args.request_notifications, today)
    }
}

/// `instant` in America/Los_Angeles, with daylight saving applied.
pub fn pacific_time(instant: OffsetDateTime) -> OffsetDateTime {
    instant.to_timezone(timezones::db::america::LOS_ANGELES)
}

pub fn date_time_payload(now: OffsetDateTime) -> Value {
    let hour = now.hour();
    let hour12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    let meridiem = if hour < 12 { "AM" } else { "PM" };

    json!({
        "formattedTime": format!("{:02}:{:02} {}", hour12, now.minute(), meridiem),
        "date": format_date(now.date()),
        "year": now.year(),
        "month": now.month() as u8,
        "day": now.day(),
        "dayOfWeek": now.weekday().to_string().to_uppercase(),
        "timezone": TIMEZONE_LABEL,
    })
}

/// Deterministic tracking result for an order id: the same id always yields
/// the same status and delivery offset.
pub fn track_order(
    order_id: &str,
    request_notifications: bool,
    today: Date,
) -> Result<Value, String> {
    if order_id.trim().is_empty() {
        return Ok(json!({ "error": "Invalid order ID" }));
    }

    let mut rng = StdRng::seed_from_u64(xxh3_64(order_id.as_bytes()) % 10_000);
    let status = pick_status(&mut rng)?;

    let estimated = match status {
        "Delivered" => today - Duration::days(rng.random_range(0..=3)),
        "Out for delivery" => today,
        _ => today + Duration::days(rng.random_range(1..=10)),
    };

    let mut result = json!({
        "orderStatus": status,
        "orderNumber": order_id,
        "estimatedDelivery": format_date(estimated),
    });

    if request_notifications && status != "Delivered" {
        result["notificationStatus"] =
            Value::String(format!("You will receive notifications for order {order_id}"));
    }

    Ok(result)
}

fn pick_status(rng: &mut impl Rng) -> Result<&'static str, String> {
    let weights = WeightedIndex::new(ORDER_STATUSES.iter().map(|(_, weight)| *weight))
        .map_err(|e| format!("Invalid status weights: {e}"))?;
    Ok(ORDER_STATUSES[weights.sample(rng)].0)
}

fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month() as u8,
        date.day()
    )
}
