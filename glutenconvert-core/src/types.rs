//! Core domain types for glutenconvert
//!
//! These types span the three subsystems: the mode-scoped chat log, the
//! background recipe-generation job, and the entitlement records that gate
//! generation.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Scope** | The identity a chat log is keyed by: a signed-in user id or a local anonymous scope |
//! | **Mode** | The active behavioral context of the assistant (general, recipe-creator, ...) |
//! | **Sub-dialog** | A clarifying exchange (serving size) that gates dispatch inside a mode |
//! | **Job** | The durable background task producing the fixed-quota recipe batch |
//! | **Actor** | The identity whose entitlement records are consulted before gated actions |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================
// Chat modes
// ============================================

/// Behavioral context of the assistant. Exactly one is active per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatMode {
    General,
    RecipeCreator,
    Conversion,
    Nutrition,
    IngredientScan,
}

impl ChatMode {
    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::General => "general",
            ChatMode::RecipeCreator => "recipe-creator",
            ChatMode::Conversion => "conversion",
            ChatMode::Nutrition => "nutrition",
            ChatMode::IngredientScan => "ingredient-scan",
        }
    }

    /// The one-time announcement emitted on entering this mode.
    ///
    /// `None` for [`ChatMode::General`]: returning to general mode is silent.
    pub fn announcement(&self) -> Option<&'static str> {
        match self {
            ChatMode::General => None,
            ChatMode::RecipeCreator => Some(
                "Recipe Creator Mode activated! I'll create a gluten-free recipe \
                 from scratch for you. First, how many servings do you need?",
            ),
            ChatMode::Conversion => Some(
                "Recipe Conversion Mode activated! Share any recipe and I'll convert \
                 it to a gluten-free version with specific substitutions.",
            ),
            ChatMode::Nutrition => Some(
                "Nutrition Mode activated! Ask me about calories, macros, and health \
                 benefits of gluten-free ingredients and dishes.",
            ),
            ChatMode::IngredientScan => Some(
                "Ingredient Scanner activated! Snap or upload a photo of any \
                 ingredient label and I'll analyze it for gluten and allergens.",
            ),
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(ChatMode::General),
            "recipe-creator" => Ok(ChatMode::RecipeCreator),
            "conversion" => Ok(ChatMode::Conversion),
            "nutrition" => Ok(ChatMode::Nutrition),
            "ingredient-scan" => Ok(ChatMode::IngredientScan),
            _ => Err(format!("unknown chat mode: {}", s)),
        }
    }
}

// ============================================
// Messages
// ============================================

/// A single entry in the append-only chat log.
///
/// Immutable once appended; identity is the id, ordering is insertion order.
/// Corrections are modeled as new messages, never as edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Message text (raw, including any unparsed analysis response)
    pub text: String,
    /// True for messages authored by the human
    pub is_from_user: bool,
    /// When the message was created
    pub ts: DateTime<Utc>,
    /// Mode the message was authored under (None for general chat)
    pub mode: Option<ChatMode>,
    /// URI or path of an attached image, if any
    pub attached_image: Option<String>,
    /// Converted recipe body for conversion-shaped responses
    pub recipe_ref: Option<String>,
}

impl Message {
    /// Create a user-authored message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, true, None)
    }

    /// Create an assistant-authored message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, false, None)
    }

    /// Create an assistant-authored message tagged with a mode
    pub fn assistant_in_mode(text: impl Into<String>, mode: ChatMode) -> Self {
        Self::new(text, false, Some(mode))
    }

    fn new(text: impl Into<String>, is_from_user: bool, mode: Option<ChatMode>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            is_from_user,
            ts: Utc::now(),
            mode,
            attached_image: None,
            recipe_ref: None,
        }
    }

    /// Attach an image reference to this message
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.attached_image = Some(image.into());
        self
    }

    /// Attach a converted-recipe body to this message
    pub fn with_recipe_ref(mut self, recipe: impl Into<String>) -> Self {
        self.recipe_ref = Some(recipe.into());
        self
    }

    /// Re-derive the structured ingredient analysis from this message's text.
    ///
    /// The analysis is never persisted independently: it is a pure function of
    /// the stored text, so recomputing it always yields the same record.
    pub fn ingredient_analysis(&self) -> Option<IngredientAnalysis> {
        crate::analysis::parse(&self.text)
    }
}

// ============================================
// Ingredient analysis
// ============================================

/// Structured projection of a free-text label-analysis response.
///
/// Every field is tolerant: an absent marker leaves the field unset rather
/// than producing an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientAnalysis {
    /// Product name, if the response named one
    pub product_name: Option<String>,
    /// Celiac safety rating ("Safe", "Caution", "Unsafe")
    pub safety_rating: Option<String>,
    /// Gluten status line ("Gluten-Free", "Contains Wheat", ...)
    pub gluten_status: Option<String>,
    /// Dairy status line
    pub dairy_status: Option<String>,
    /// Vegan status line
    pub vegan_status: Option<String>,
    /// Individual allergen warnings, comma-split and trimmed
    pub allergen_warnings: Vec<String>,
    /// Product category, if stated
    pub product_category: Option<String>,
}

// ============================================
// Generation jobs
// ============================================

/// Total number of recipes a generation job produces
pub const TOTAL_TARGET: i64 = 400;

/// Recipes produced per category
pub const CATEGORY_TARGET: i64 = 100;

/// Recipe categories, generated in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeCategory {
    Breakfast,
    Snack,
    Lunch,
    Dinner,
}

impl RecipeCategory {
    /// All categories in generation order
    pub const ALL: [RecipeCategory; 4] = [
        RecipeCategory::Breakfast,
        RecipeCategory::Snack,
        RecipeCategory::Lunch,
        RecipeCategory::Dinner,
    ];

    /// Returns the identifier used in database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeCategory::Breakfast => "breakfast",
            RecipeCategory::Snack => "snack",
            RecipeCategory::Lunch => "lunch",
            RecipeCategory::Dinner => "dinner",
        }
    }

    /// Human-friendly name for prompts and display
    pub fn display_name(&self) -> &'static str {
        match self {
            RecipeCategory::Breakfast => "Breakfast",
            RecipeCategory::Snack => "Snack",
            RecipeCategory::Lunch => "Lunch",
            RecipeCategory::Dinner => "Dinner",
        }
    }
}

impl std::fmt::Display for RecipeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecipeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breakfast" => Ok(RecipeCategory::Breakfast),
            "snack" => Ok(RecipeCategory::Snack),
            "lunch" => Ok(RecipeCategory::Lunch),
            "dinner" => Ok(RecipeCategory::Dinner),
            _ => Err(format!("unknown recipe category: {}", s)),
        }
    }
}

/// Status of a generation job. Transitions only move forward:
/// `pending -> running -> (completed | failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal jobs never change again; a retry means a new job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("unknown job status: {}", s)),
        }
    }
}

/// Durable record of a batch generation job.
///
/// The database row is the sole source of truth: any session belonging to the
/// owner can poll it, which is what makes the job survive navigation and
/// device switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Owner this job belongs to
    pub owner_id: String,
    /// Forward-only status
    pub status: JobStatus,
    /// Recipes durably written so far; monotonically non-decreasing
    pub generated_count: i64,
    /// Fixed quota for the whole batch
    pub total_target: i64,
    /// Category currently in progress (None before the first item and after completion)
    pub current_category: Option<RecipeCategory>,
    /// When the job was created
    pub started_at: DateTime<Utc>,
    /// Set when the job reaches `completed`
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when the job reaches `failed`
    pub error_message: Option<String>,
}

impl GenerationJob {
    /// Create a fresh pending job for an owner
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            status: JobStatus::Pending,
            generated_count: 0,
            total_target: TOTAL_TARGET,
            current_category: None,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }
}

/// A single AI-authored recipe produced by a generation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedRecipe {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Job that produced this recipe
    pub job_id: String,
    /// Category the recipe belongs to
    pub category: RecipeCategory,
    /// Recipe title, e.g. "Gluten-Free Blueberry Pancakes"
    pub title: String,
    /// Full recipe body (ingredients, steps, notes)
    pub body: String,
    /// When the recipe was written
    pub created_at: DateTime<Utc>,
}

impl GeneratedRecipe {
    pub fn new(
        job_id: impl Into<String>,
        category: RecipeCategory,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            category,
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

// ============================================
// Entitlements
// ============================================

/// Subscription tier that carries generation access automatically
pub const TOP_ANNUAL_TIER: &str = "Annual";

/// The identity whose entitlement is being evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// Owner identifier (primary match key)
    pub user_id: String,
    /// Contact address, used as a fallback purchase match key
    pub email: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Role record: the owner flag short-circuits every other check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRecord {
    pub user_id: String,
    pub is_owner: bool,
}

/// Subscription record sourced from the billing system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: String,
    /// Tier name ("Monthly", "Annual"); None when lapsed
    pub tier: Option<String>,
    /// Next renewal date, if subscribed
    pub renews_at: Option<DateTime<Utc>>,
}

/// Durable one-time-purchase record for the generator upgrade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub user_id: String,
    /// Contact address recorded at purchase time (fallback match key)
    pub email: Option<String>,
    /// Set by the external checkout flow once payment clears
    pub paid: bool,
    pub purchased_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_chat_mode_round_trip() {
        for mode in [
            ChatMode::General,
            ChatMode::RecipeCreator,
            ChatMode::Conversion,
            ChatMode::Nutrition,
            ChatMode::IngredientScan,
        ] {
            assert_eq!(ChatMode::from_str(mode.as_str()).unwrap(), mode);
        }
    }

    #[test]
    fn test_general_mode_has_no_announcement() {
        assert!(ChatMode::General.announcement().is_none());
        assert!(ChatMode::RecipeCreator.announcement().is_some());
    }

    #[test]
    fn test_job_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_category_order_and_quota() {
        assert_eq!(RecipeCategory::ALL[0], RecipeCategory::Breakfast);
        assert_eq!(RecipeCategory::ALL[3], RecipeCategory::Dinner);
        assert_eq!(CATEGORY_TARGET * RecipeCategory::ALL.len() as i64, TOTAL_TARGET);
    }

    #[test]
    fn test_message_constructors() {
        let m = Message::user("hello");
        assert!(m.is_from_user);
        assert!(m.mode.is_none());

        let m = Message::assistant_in_mode("converted", ChatMode::Conversion)
            .with_recipe_ref("1 cup rice flour...");
        assert!(!m.is_from_user);
        assert_eq!(m.mode, Some(ChatMode::Conversion));
        assert!(m.recipe_ref.is_some());
    }
}
