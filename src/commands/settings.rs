use tracing::info;

use super::{ChatError, Orchestrator};
use crate::db::models::{Preferences, TimeHorizon};
use crate::llm::{find_model, ModelInfo, MODEL_CATALOG};
use crate::session::PreferenceUpdate;

impl Orchestrator {
    /// Select the model for subsequent turns. A turn already in flight keeps
    /// the model it was dispatched with.
    pub fn change_model(&self, model_id: &str) -> Result<(), ChatError> {
        let model = find_model(model_id).ok_or_else(|| ChatError::UnknownModel(model_id.to_string()))?;
        self.store
            .borrow_mut()
            .update_preference(PreferenceUpdate::SelectedModel(model.id.to_string()));
        info!(model = model.id, "model selected");
        Ok(())
    }

    pub fn set_streaming(&self, enabled: bool) {
        self.store
            .borrow_mut()
            .update_preference(PreferenceUpdate::StreamingEnabled(enabled));
        info!(enabled, "streaming preference updated");
    }

    pub fn set_time_horizon(&self, horizon: TimeHorizon) {
        self.store
            .borrow_mut()
            .update_preference(PreferenceUpdate::TimeHorizon(horizon));
        info!(horizon = horizon.as_str(), "time horizon updated");
    }

    pub fn preferences(&self) -> Preferences {
        self.store.borrow_mut().load_preferences()
    }

    pub fn selected_model(&self) -> String {
        self.preferences().selected_model
    }

    pub fn available_models(&self) -> &'static [ModelInfo] {
        MODEL_CATALOG
    }
}
