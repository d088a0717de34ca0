use std::path::Path;
use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};

use lektor_common::api::ReviewApiClient;
use lektor_common::mcp_api::{
    EditRulesParams, GuidelineListResponse, LoadGuidelineParams, SaveGuidelineParams,
    SelectCriterionParams, SetGuidelineFileParams, SetLanguageParams, SetRulesSourceParams,
    SetTargetDocumentParams,
};
use lektor_common::model::DocumentFile;
use lektor_workflow::error::WorkflowError;
use lektor_workflow::orchestrator::Orchestrator;
use lektor_workflow::snapshot::WorkflowSnapshot;

type Session = Orchestrator<ReviewApiClient>;

#[derive(Clone)]
pub struct LektorServer {
    session: Arc<Session>,
    tool_router: ToolRouter<LektorServer>,
}

impl LektorServer {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            tool_router: Self::tool_router(),
        }
    }

    fn respond(&self, result: Result<(), WorkflowError>) -> Result<Json<WorkflowSnapshot>, String> {
        result.map_err(|e| e.to_string())?;
        Ok(Json(self.session.snapshot()))
    }
}

async fn read_document(path: &str) -> Result<DocumentFile, String> {
    let path = path.trim();
    if path.is_empty() {
        return Err("path must not be empty".to_string());
    }
    DocumentFile::from_path(Path::new(path))
        .await
        .map_err(|e| e.to_string())
}

#[tool_router]
impl LektorServer {
    #[tool(description = "Show the current review session: stage, rules, criteria, selection, language, target document, report, busy flags and saved guidelines.")]
    async fn workflow_status(&self) -> Result<Json<WorkflowSnapshot>, String> {
        Ok(Json(self.session.snapshot()))
    }

    #[tool(description = "Stage 1: set the journal guidelines as free text or a URL. Replaces any guideline file; blank text clears the source.")]
    async fn set_rules_source(
        &self,
        Parameters(params): Parameters<SetRulesSourceParams>,
    ) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.set_rules_source(params.text))
    }

    #[tool(description = "Stage 1: use a guideline document (PDF, DOCX or text) from the local filesystem as the rules source. Replaces any free text.")]
    async fn set_guideline_file(
        &self,
        Parameters(params): Parameters<SetGuidelineFileParams>,
    ) -> Result<Json<WorkflowSnapshot>, String> {
        let file = read_document(&params.path).await?;
        self.respond(self.session.set_guideline_file(file))
    }

    #[tool(description = "Stage 1: send the rules source to the extraction service (POST /extract-rules) and move to stage 2 with the extracted YAML rules and derived criteria.")]
    async fn extract_rules(&self) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.extract_rules().await)
    }

    #[tool(description = "Stage 1: skip extraction and move to stage 2 with the general academic review rules and fallback criteria.")]
    async fn skip_to_default(&self) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.skip_to_default())
    }

    #[tool(description = "Stage 2: replace the YAML rules text. Criteria are re-derived; a selection that disappears falls back to \"All criteria\".")]
    async fn edit_rules(
        &self,
        Parameters(params): Parameters<EditRulesParams>,
    ) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.edit_rules(params.rules_yaml))
    }

    #[tool(description = "Stage 2: choose the criterion to analyze, or \"All criteria\" for a full review.")]
    async fn select_criterion(
        &self,
        Parameters(params): Parameters<SelectCriterionParams>,
    ) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.select_criterion(params.criterion.trim()))
    }

    #[tool(description = "Stages 1-2: set the report language (one of the configured codes, e.g. hu, en, de).")]
    async fn set_language(
        &self,
        Parameters(params): Parameters<SetLanguageParams>,
    ) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.set_language(&params.language))
    }

    #[tool(description = "Stages 1-2: choose the paper to review from the local filesystem. Omit path to clear the selection.")]
    async fn set_target_document(
        &self,
        Parameters(params): Parameters<SetTargetDocumentParams>,
    ) -> Result<Json<WorkflowSnapshot>, String> {
        let document = match params.path.as_deref() {
            Some(path) => Some(read_document(path).await?),
            None => None,
        };
        self.respond(self.session.set_target_document(document))
    }

    #[tool(description = "Stage 2: send the paper, rules, criterion and language to the analysis service (POST /analyze) and move to stage 3 with the markdown report.")]
    async fn analyze_paper(&self) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.analyze_paper().await)
    }

    #[tool(description = "Stage 2: go back to stage 1. Rules, rules source and target document are kept.")]
    async fn go_back(&self) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.back())
    }

    #[tool(description = "Stage 3: close the report and start over in stage 1. The rules are kept; the report and target document are cleared.")]
    async fn new_analysis(&self) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.new_analysis())
    }

    #[tool(description = "Refresh the list of saved guidelines (GET /guidelines). On failure the previously cached list is returned with a warning.")]
    async fn list_guidelines(&self) -> Result<Json<GuidelineListResponse>, String> {
        let response = match self.session.list_guidelines().await {
            Ok(guidelines) => GuidelineListResponse {
                guidelines,
                warning: None,
            },
            Err(e) => GuidelineListResponse {
                guidelines: self.session.repository().cached(),
                warning: Some(e.to_string()),
            },
        };
        Ok(Json(response))
    }

    #[tool(description = "Save the current rules text to the guideline store under a name (POST /save-guideline), then refresh the saved list.")]
    async fn save_guideline(
        &self,
        Parameters(params): Parameters<SaveGuidelineParams>,
    ) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.save_guideline(&params.name).await)
    }

    #[tool(description = "Stages 1-2: load a saved guideline by id or filename (GET /guideline/{filename}) and move to stage 2 with its rules.")]
    async fn load_guideline(
        &self,
        Parameters(params): Parameters<LoadGuidelineParams>,
    ) -> Result<Json<WorkflowSnapshot>, String> {
        self.respond(self.session.load_guideline(&params.id).await)
    }
}

#[tool_handler]
impl ServerHandler for LektorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "lektor".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Academic paper review workflow. Stage 1: set_rules_source or set_guideline_file, \
then extract_rules (or skip_to_default, or load_guideline). Stage 2: optionally edit_rules, \
select_criterion and set_language, choose the paper with set_target_document, then \
analyze_paper. Stage 3: read the report from the returned status, then new_analysis. \
workflow_status shows the session at any time; save_guideline and list_guidelines manage the \
guideline store."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LektorServer;

    #[test]
    fn tools_publish_output_schemas() {
        let tools = LektorServer::tool_router().list_all();
        for name in [
            "workflow_status",
            "set_rules_source",
            "set_guideline_file",
            "extract_rules",
            "skip_to_default",
            "edit_rules",
            "select_criterion",
            "set_language",
            "set_target_document",
            "analyze_paper",
            "go_back",
            "new_analysis",
            "list_guidelines",
            "save_guideline",
            "load_guideline",
        ] {
            let tool = tools
                .iter()
                .find(|t| t.name == name)
                .unwrap_or_else(|| panic!("missing tool: {name}"));
            assert!(
                tool.output_schema.is_some(),
                "tool {name} should publish output_schema"
            );
        }
    }

    #[tokio::test]
    async fn document_paths_are_checked() {
        assert!(super::read_document("  ").await.is_err());
        assert!(super::read_document("/definitely/not/here.pdf").await.is_err());
    }
}
