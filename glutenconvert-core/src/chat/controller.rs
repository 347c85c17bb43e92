//! Mode controller
//!
//! Owns the per-session conversational state machine: the active mode, the
//! serving-size sub-dialog, and the exactly-once announcement memory. All
//! transitions go through these methods; the session processes one event at a
//! time, so the state never changes mid-operation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::CapturedImage;
use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::gateway::{InferenceGateway, InferenceReply, InferenceRequest};
use crate::types::{ChatMode, Message};

use super::store::ChatSessionStore;

/// Serving-size presets offered alongside the custom input
pub const SERVING_PRESETS: [u32; 4] = [1, 2, 4, 6];

/// Follow-up appended shortly after the serving size is resolved
pub const SERVING_FOLLOW_UP: &str = "Thanks for the serving size! What amazing \
    gluten-free recipe can I create for you?";

/// Acknowledgement appended before the first recipe request is dispatched
pub const RECIPE_ACKNOWLEDGEMENT: &str = "Great choice! Let me work on that \
    gluten-free recipe for you.";

/// Appended in place of a reply when the inference call fails
pub const FALLBACK_MESSAGE: &str = "I'm having technical difficulties right now. \
    Please try again in a moment.";

/// User-visible text of an image scan message
const SCAN_USER_TEXT: &str = "Please analyze this ingredient label.";

/// Instruction sent with the image payload
const SCAN_PROMPT: &str = "Analyze this ingredient label photo for gluten and \
    allergens. Report the product name, a celiac safety rating, gluten, dairy \
    and vegan status, allergens, and the product category, one per line.";

pub struct ModeController<G: InferenceGateway> {
    store: ChatSessionStore,
    gateway: G,
    config: ChatConfig,
    mode: ChatMode,
    awaiting_serving_size: bool,
    serving_size: Option<u32>,
    /// Modes announced since the last reset
    announced: HashSet<ChatMode>,
    /// Pending acknowledgement for the first recipe request after mode entry
    awaiting_first_recipe_message: bool,
    /// Bumped on reset; a scheduled follow-up from an older epoch is dropped
    epoch: Arc<AtomicU64>,
}

impl<G: InferenceGateway> ModeController<G> {
    pub fn new(store: ChatSessionStore, gateway: G, config: ChatConfig) -> Self {
        Self {
            store,
            gateway,
            config,
            mode: ChatMode::General,
            awaiting_serving_size: false,
            serving_size: None,
            announced: HashSet::new(),
            awaiting_first_recipe_message: false,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn awaiting_serving_size(&self) -> bool {
        self.awaiting_serving_size
    }

    pub fn serving_size(&self) -> Option<u32> {
        self.serving_size
    }

    pub fn store(&self) -> &ChatSessionStore {
        &self.store
    }

    /// Switch the active mode.
    ///
    /// Re-entering the current mode is a no-op. Entering a non-general mode
    /// announces it at most once per reset; entering the recipe creator also
    /// opens the serving-size sub-dialog.
    pub fn enter_mode(&mut self, mode: ChatMode) -> Result<()> {
        if mode == self.mode {
            return Ok(());
        }

        tracing::debug!(from = %self.mode, to = %mode, "Mode change");
        self.mode = mode;

        if let Some(text) = mode.announcement() {
            if !self.announced.contains(&mode) {
                self.store.append(&Message::assistant_in_mode(text, mode))?;
                self.announced.insert(mode);
            }
        }

        if mode == ChatMode::RecipeCreator {
            // A size resolved earlier in the session stays resolved; only a
            // reset re-opens the question.
            if self.serving_size.is_none() {
                self.awaiting_serving_size = true;
            }
            self.awaiting_first_recipe_message = true;
        } else {
            // The sub-dialog only gates the recipe creator
            self.awaiting_serving_size = false;
        }

        Ok(())
    }

    /// Resolve the serving-size sub-dialog with a preset or custom value.
    ///
    /// Valid only while the question is pending, so a second call cannot
    /// schedule a second follow-up. The follow-up message lands after a short
    /// delay; a session reset during that window suppresses it.
    pub fn resolve_serving_size(&mut self, n: u32) -> Result<()> {
        if !self.awaiting_serving_size {
            return Err(Error::InvalidInput(
                "no serving-size question is pending".to_string(),
            ));
        }
        if n == 0 {
            return Err(Error::InvalidInput(
                "serving size must be a positive integer".to_string(),
            ));
        }

        self.serving_size = Some(n);
        self.awaiting_serving_size = false;
        tracing::debug!(serving_size = n, "Serving size resolved");

        let store = self.store.clone();
        let epoch = self.epoch.clone();
        let issued_at = epoch.load(Ordering::SeqCst);
        let delay = Duration::from_millis(self.config.follow_up_delay_ms);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if epoch.load(Ordering::SeqCst) != issued_at {
                return;
            }
            let follow_up =
                Message::assistant_in_mode(SERVING_FOLLOW_UP, ChatMode::RecipeCreator);
            if let Err(e) = store.append(&follow_up) {
                tracing::warn!(error = %e, "Failed to append serving-size follow-up");
            }
        });

        Ok(())
    }

    /// Append a user message and dispatch it under the active mode.
    ///
    /// Returns the assistant message that was appended in response; a failed
    /// inference call yields the fallback message, never an error, and leaves
    /// all mode state untouched.
    pub async fn submit_user_message(&mut self, text: &str) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("message is empty".to_string()));
        }
        if self.awaiting_serving_size {
            return Err(Error::InvalidInput(
                "serving size must be resolved before sending messages".to_string(),
            ));
        }

        let mut user_msg = Message::user(text);
        if self.mode != ChatMode::General {
            user_msg.mode = Some(self.mode);
        }
        self.store.append(&user_msg)?;

        if self.mode == ChatMode::RecipeCreator && self.awaiting_first_recipe_message {
            self.store.append(&Message::assistant_in_mode(
                RECIPE_ACKNOWLEDGEMENT,
                ChatMode::RecipeCreator,
            ))?;
            self.awaiting_first_recipe_message = false;
        }

        let mut request = InferenceRequest::new(text, self.mode);
        if self.mode == ChatMode::RecipeCreator {
            if let Some(n) = self.serving_size {
                request = request.with_serving_size(n);
            }
        }

        self.dispatch(request).await
    }

    /// Send a captured label image through the scan flow.
    ///
    /// Only valid in ingredient-scan mode; the raw response text is stored
    /// as-is and the structured analysis is re-derived from it on read.
    pub async fn submit_image(&mut self, image: &CapturedImage) -> Result<Message> {
        if self.mode != ChatMode::IngredientScan {
            return Err(Error::InvalidInput(
                "image scans require ingredient-scan mode".to_string(),
            ));
        }

        let mut user_msg = Message::user(SCAN_USER_TEXT).with_image(&image.source);
        user_msg.mode = Some(ChatMode::IngredientScan);
        self.store.append(&user_msg)?;

        let request = InferenceRequest::new(SCAN_PROMPT, ChatMode::IngredientScan)
            .with_image(image.data.clone());
        self.dispatch(request).await
    }

    /// Return to general mode and wipe the session.
    ///
    /// Clears the sub-dialog state, the announcement memory, and the whole
    /// chat log. Any follow-up still pending from before the reset is
    /// suppressed. Idempotent.
    pub fn reset_to_general(&mut self) -> Result<()> {
        self.mode = ChatMode::General;
        self.awaiting_serving_size = false;
        self.serving_size = None;
        self.awaiting_first_recipe_message = false;
        self.announced.clear();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.store.clear()
    }

    async fn dispatch(&self, request: InferenceRequest) -> Result<Message> {
        let mode = request.mode;
        match self.gateway.send(request).await {
            Ok(reply) => {
                let message = match reply {
                    InferenceReply::Text(text) => self.assistant_message(text, mode),
                    InferenceReply::ConvertedRecipe { summary, recipe } => {
                        self.assistant_message(summary, mode).with_recipe_ref(recipe)
                    }
                };
                self.store.append(&message)?;
                Ok(message)
            }
            Err(e) => {
                tracing::warn!(error = %e, %mode, "Inference request failed");
                let fallback = self.assistant_message(FALLBACK_MESSAGE.to_string(), mode);
                self.store.append(&fallback)?;
                Ok(fallback)
            }
        }
    }

    fn assistant_message(&self, text: String, mode: ChatMode) -> Message {
        if mode == ChatMode::General {
            Message::assistant(text)
        } else {
            Message::assistant_in_mode(text, mode)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture;
    use crate::db::Database;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Gateway that records requests and replays scripted replies
    struct ScriptedGateway {
        requests: Mutex<Vec<InferenceRequest>>,
        replies: Mutex<VecDeque<Result<InferenceReply>>>,
    }

    impl ScriptedGateway {
        fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                replies: Mutex::new(VecDeque::new()),
            }
        }

        fn push_reply(&self, reply: Result<InferenceReply>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> InferenceRequest {
            self.requests.lock().unwrap().last().unwrap().clone()
        }
    }

    impl InferenceGateway for &ScriptedGateway {
        async fn send(&self, request: InferenceRequest) -> Result<InferenceReply> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(InferenceReply::Text("ok".to_string())))
        }
    }

    fn controller(gateway: &ScriptedGateway) -> ModeController<&ScriptedGateway> {
        controller_with_delay(gateway, 10)
    }

    fn controller_with_delay(
        gateway: &ScriptedGateway,
        follow_up_delay_ms: u64,
    ) -> ModeController<&ScriptedGateway> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.migrate().unwrap();
        let store = ChatSessionStore::new(db, "user-1");
        ModeController::new(store, gateway, ChatConfig { follow_up_delay_ms })
    }

    #[tokio::test]
    async fn test_recipe_creator_entry_and_serving_size() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller(&gateway);

        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        assert!(ctl.awaiting_serving_size());
        let log = ctl.store().all().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].mode, Some(ChatMode::RecipeCreator));

        ctl.resolve_serving_size(4).unwrap();
        assert!(!ctl.awaiting_serving_size());
        assert_eq!(ctl.serving_size(), Some(4));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let log = ctl.store().all().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].text, SERVING_FOLLOW_UP);
    }

    #[tokio::test]
    async fn test_serving_size_resolution_is_exactly_once() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller(&gateway);

        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        ctl.resolve_serving_size(2).unwrap();
        assert!(ctl.resolve_serving_size(6).is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let follow_ups = ctl
            .store()
            .all()
            .unwrap()
            .iter()
            .filter(|m| m.text == SERVING_FOLLOW_UP)
            .count();
        assert_eq!(follow_ups, 1);
    }

    #[tokio::test]
    async fn test_invalid_serving_sizes_rejected() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller(&gateway);

        // Not awaiting
        assert!(ctl.resolve_serving_size(4).is_err());

        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        assert!(ctl.resolve_serving_size(0).is_err());
        // A rejected value leaves the sub-dialog open
        assert!(ctl.awaiting_serving_size());
        ctl.resolve_serving_size(3).unwrap();
    }

    #[tokio::test]
    async fn test_announcement_is_once_per_mode_until_reset() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller(&gateway);

        ctl.enter_mode(ChatMode::Nutrition).unwrap();
        ctl.enter_mode(ChatMode::General).unwrap();
        ctl.enter_mode(ChatMode::Nutrition).unwrap();
        assert_eq!(ctl.store().len().unwrap(), 1);

        // Re-entering the current mode is a no-op
        ctl.enter_mode(ChatMode::Nutrition).unwrap();
        assert_eq!(ctl.store().len().unwrap(), 1);

        // A different mode announces independently
        ctl.enter_mode(ChatMode::Conversion).unwrap();
        assert_eq!(ctl.store().len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_resolved_serving_size_survives_mode_round_trip() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller(&gateway);

        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        ctl.resolve_serving_size(4).unwrap();

        ctl.enter_mode(ChatMode::Nutrition).unwrap();
        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();

        // Re-entry does not re-open the sub-dialog once a size is set
        assert!(!ctl.awaiting_serving_size());
        assert_eq!(ctl.serving_size(), Some(4));
        ctl.submit_user_message("waffles please").await.unwrap();
        assert_eq!(gateway.last_request().serving_size, Some(4));

        // Only a reset re-opens the question
        ctl.reset_to_general().unwrap();
        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        assert!(ctl.awaiting_serving_size());
        assert!(ctl.serving_size().is_none());
    }

    #[tokio::test]
    async fn test_submit_blocked_while_awaiting_serving_size() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller(&gateway);

        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        assert!(ctl.submit_user_message("make me pancakes").await.is_err());
        assert_eq!(gateway.request_count(), 0);
    }

    #[tokio::test]
    async fn test_first_recipe_message_is_acknowledged() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller(&gateway);

        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        ctl.resolve_serving_size(2).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        ctl.submit_user_message("blueberry pancakes").await.unwrap();
        let log = ctl.store().all().unwrap();
        // announcement, follow-up, user, acknowledgement, reply
        assert_eq!(log.len(), 5);
        assert_eq!(log[3].text, RECIPE_ACKNOWLEDGEMENT);
        assert_eq!(gateway.last_request().serving_size, Some(2));

        // Only the first message gets the acknowledgement
        ctl.submit_user_message("make it vegan too").await.unwrap();
        let log = ctl.store().all().unwrap();
        assert_eq!(log.len(), 7);
        assert_ne!(log[5].text, RECIPE_ACKNOWLEDGEMENT);
    }

    #[tokio::test]
    async fn test_empty_message_rejected_locally() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller(&gateway);

        assert!(ctl.submit_user_message("   ").await.is_err());
        assert_eq!(gateway.request_count(), 0);
        assert!(ctl.store().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_gateway_failure_appends_fallback() {
        let gateway = ScriptedGateway::new();
        gateway.push_reply(Err(Error::Inference("service down".to_string())));
        let mut ctl = controller(&gateway);

        ctl.enter_mode(ChatMode::Nutrition).unwrap();
        let reply = ctl.submit_user_message("how much protein?").await.unwrap();
        assert_eq!(reply.text, FALLBACK_MESSAGE);

        // Mode state is untouched by the failure
        assert_eq!(ctl.mode(), ChatMode::Nutrition);
        let log = ctl.store().all().unwrap();
        assert_eq!(log.last().unwrap().text, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn test_conversion_reply_carries_recipe() {
        let gateway = ScriptedGateway::new();
        gateway.push_reply(Ok(InferenceReply::ConvertedRecipe {
            summary: "Here's your gluten-free version!".to_string(),
            recipe: "1 cup rice flour...".to_string(),
        }));
        let mut ctl = controller(&gateway);

        ctl.enter_mode(ChatMode::Conversion).unwrap();
        let reply = ctl
            .submit_user_message("convert grandma's bread recipe: ...")
            .await
            .unwrap();
        assert_eq!(reply.recipe_ref.as_deref(), Some("1 cup rice flour..."));
        assert_eq!(reply.mode, Some(ChatMode::Conversion));
    }

    #[tokio::test]
    async fn test_image_scan_flow() {
        let gateway = ScriptedGateway::new();
        gateway.push_reply(Ok(InferenceReply::Text(
            "Gluten Status: Contains Wheat\nAllergens: wheat, soy".to_string(),
        )));
        let mut ctl = controller(&gateway);

        let image = capture::from_bytes(b"label-bytes", "image/jpeg", "camera").unwrap();

        // Scans outside ingredient-scan mode are rejected
        assert!(ctl.submit_image(&image).await.is_err());

        ctl.enter_mode(ChatMode::IngredientScan).unwrap();
        let reply = ctl.submit_image(&image).await.unwrap();

        assert!(gateway.last_request().image.is_some());
        let analysis = reply.ingredient_analysis().unwrap();
        assert_eq!(analysis.gluten_status.as_deref(), Some("Contains Wheat"));
        assert_eq!(analysis.allergen_warnings, vec!["wheat", "soy"]);

        let log = ctl.store().all().unwrap();
        assert!(log[1].attached_image.is_some());
    }

    #[tokio::test]
    async fn test_reset_clears_session_and_reannounces() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller(&gateway);

        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        ctl.resolve_serving_size(4).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        ctl.reset_to_general().unwrap();
        assert_eq!(ctl.mode(), ChatMode::General);
        assert!(!ctl.awaiting_serving_size());
        assert!(ctl.serving_size().is_none());
        assert!(ctl.store().is_empty().unwrap());

        // Reset is idempotent
        ctl.reset_to_general().unwrap();

        // The announcement memory was cleared with the log
        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        let log = ctl.store().all().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].mode, Some(ChatMode::RecipeCreator));
    }

    #[tokio::test]
    async fn test_reset_suppresses_pending_follow_up() {
        let gateway = ScriptedGateway::new();
        let mut ctl = controller_with_delay(&gateway, 100);

        ctl.enter_mode(ChatMode::RecipeCreator).unwrap();
        ctl.resolve_serving_size(4).unwrap();
        // Reset lands inside the follow-up delay window
        ctl.reset_to_general().unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(ctl.store().is_empty().unwrap());
    }
}
