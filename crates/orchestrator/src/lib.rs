//! Chapter Processing Orchestrator
//!
//! Coordinates execution of document processing stages for a staged chapter.
//! Implements a stage graph with dependency resolution and parallel execution;
//! dependents of a failed stage are failed explicitly rather than left waiting.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use doc_pipeline_assembly::{AssemblySummary, ManualAssembler};
use doc_pipeline_common::{PipelineError, Result};
use doc_pipeline_events::EventPublisher;
use doc_pipeline_extraction::{ExtractionSummary, ImageExtractor};
use doc_pipeline_markdown::{MarkdownGenerator, MarkdownSummary, TextGenerator};
use doc_pipeline_ocr::{OcrEngine, OcrProcessor, OcrSummary};
use doc_pipeline_storage::ObjectStore;

/// Stage types that can be executed by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageType {
    /// Extract embedded images from the staged document archive
    ImageExtraction,
    /// Run text detection over the extracted images
    Ocr,
    /// Generate one markdown step per OCR text file
    MarkdownGeneration,
    /// Combine the steps into the final chapter manual
    Assembly,
}

impl StageType {
    /// Get human-readable stage name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::ImageExtraction => "image_extraction",
            Self::Ocr => "ocr",
            Self::MarkdownGeneration => "markdown_generation",
            Self::Assembly => "assembly",
        }
    }

    /// Canonical execution order of the full pipeline
    #[must_use]
    pub fn pipeline_order() -> Vec<StageType> {
        vec![
            Self::ImageExtraction,
            Self::Ocr,
            Self::MarkdownGeneration,
            Self::Assembly,
        ]
    }
}

/// Current state of a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
    /// Stage is waiting for dependencies
    Pending,
    /// Stage is ready to execute (dependencies satisfied)
    Ready,
    /// Stage is currently executing
    Running,
    /// Stage completed successfully
    Completed,
    /// Stage failed with error
    Failed(String),
}

/// Result of a stage execution
#[derive(Debug, Clone, Serialize)]
pub enum StageResult {
    /// Image extraction result
    ImageExtraction(ExtractionSummary),
    /// OCR result
    Ocr(OcrSummary),
    /// Markdown generation result
    MarkdownGeneration(MarkdownSummary),
    /// Assembly result
    Assembly(AssemblySummary),
}

/// A single stage in the processing graph
#[derive(Debug, Clone)]
pub struct Stage {
    /// Unique stage identifier
    pub id: String,
    /// Type of stage to execute
    pub stage_type: StageType,
    /// IDs of stages this stage depends on
    pub dependencies: Vec<String>,
    /// Current state of the stage
    pub state: StageState,
    /// Result of stage execution (if completed)
    pub result: Option<StageResult>,
}

impl Stage {
    /// Create a new stage
    #[must_use]
    pub fn new(id: String, stage_type: StageType, dependencies: Vec<String>) -> Self {
        Self {
            id,
            stage_type,
            dependencies,
            state: StageState::Pending,
            result: None,
        }
    }

    /// Check if stage is ready to execute (all dependencies completed)
    #[must_use]
    pub fn is_ready(&self, completed_stages: &HashSet<String>) -> bool {
        self.state == StageState::Pending
            && self
                .dependencies
                .iter()
                .all(|dep| completed_stages.contains(dep))
    }
}

/// Stage graph for coordinating one chapter's processing pipeline
#[derive(Clone)]
pub struct StageGraph {
    /// Chapter folder being processed
    pub chapter: String,
    /// Bucket holding the staged document and all derived artifacts
    pub bucket: String,
    /// Key of the staged document archive
    pub document_key: String,
    /// All stages in the graph
    stages: HashMap<String, Stage>,
    /// Completed stage IDs
    completed: HashSet<String>,
    /// Failed stage IDs
    failed: HashSet<String>,
}

impl StageGraph {
    /// Create a new stage graph
    #[must_use]
    pub fn new(chapter: String, bucket: String, document_key: String) -> Self {
        Self {
            chapter,
            bucket,
            document_key,
            stages: HashMap::with_capacity(4), // Full pipeline has four stages
            completed: HashSet::with_capacity(4),
            failed: HashSet::with_capacity(2),
        }
    }

    /// Add a stage to the graph
    pub fn add_stage(&mut self, id: String, stage_type: StageType, dependencies: Vec<String>) {
        let stage = Stage::new(id.clone(), stage_type, dependencies);
        self.stages.insert(id, stage);
    }

    /// Get all stages that are ready to execute
    #[must_use]
    pub fn get_ready_stages(&self) -> Vec<String> {
        self.stages
            .values()
            .filter(|stage| stage.is_ready(&self.completed))
            .map(|stage| stage.id.clone())
            .collect()
    }

    /// Mark a stage as running
    pub fn mark_running(&mut self, stage_id: &str) {
        if let Some(stage) = self.stages.get_mut(stage_id) {
            stage.state = StageState::Running;
        }
    }

    /// Mark a stage as completed
    pub fn mark_completed(&mut self, stage_id: &str, result: StageResult) {
        if let Some(stage) = self.stages.get_mut(stage_id) {
            stage.state = StageState::Completed;
            stage.result = Some(result);
            self.completed.insert(stage_id.to_string());
        }
    }

    /// Mark a stage as failed
    pub fn mark_failed(&mut self, stage_id: &str, error: String) {
        if let Some(stage) = self.stages.get_mut(stage_id) {
            stage.state = StageState::Failed(error);
            self.failed.insert(stage_id.to_string());
        }
    }

    /// Fail every pending stage that depends on an already failed stage
    ///
    /// Returns the number of stages newly failed. Only direct dependents are
    /// failed per call; the execute loop reaches transitive dependents on
    /// subsequent passes.
    pub fn fail_blocked_stages(&mut self) -> usize {
        let blocked: Vec<(String, String)> = self
            .stages
            .values()
            .filter(|stage| stage.state == StageState::Pending)
            .filter_map(|stage| {
                stage
                    .dependencies
                    .iter()
                    .find(|dep| self.failed.contains(*dep))
                    .map(|dep| (stage.id.clone(), dep.clone()))
            })
            .collect();

        for (stage_id, dep) in &blocked {
            warn!("Stage {} blocked by failed dependency: {}", stage_id, dep);
            self.mark_failed(stage_id, format!("Dependency failed: {dep}"));
        }

        blocked.len()
    }

    /// Check if all stages have settled (completed or failed)
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stages
            .values()
            .all(|stage| matches!(stage.state, StageState::Completed | StageState::Failed(_)))
    }

    /// Check if any stage has failed
    #[must_use]
    pub fn has_failed(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Get stage result by ID
    #[must_use]
    pub fn get_result(&self, stage_id: &str) -> Option<&StageResult> {
        self.stages
            .get(stage_id)
            .and_then(|stage| stage.result.as_ref())
    }

    /// Get all stages (read-only)
    #[must_use]
    pub fn stages(&self) -> &HashMap<String, Stage> {
        &self.stages
    }

    /// Get completed stage IDs
    #[must_use]
    pub fn completed_stages(&self) -> &HashSet<String> {
        &self.completed
    }

    /// Get failed stage IDs
    #[must_use]
    pub fn failed_stages(&self) -> &HashSet<String> {
        &self.failed
    }

    /// Validate stage graph (check for cycles, missing dependencies)
    pub fn validate(&self) -> Result<()> {
        // Check all dependencies exist
        for stage in self.stages.values() {
            for dep in &stage.dependencies {
                if !self.stages.contains_key(dep) {
                    return Err(PipelineError::Other(format!(
                        "Stage '{}' has missing dependency: '{}'",
                        stage.id, dep
                    )));
                }
            }
        }

        // Check for cycles using DFS
        let mut visited = HashSet::with_capacity(self.stages.len());
        let mut recursion_stack = HashSet::with_capacity(self.stages.len());

        for stage_id in self.stages.keys().map(String::as_str) {
            if self.has_cycle(stage_id, &mut visited, &mut recursion_stack) {
                return Err(PipelineError::Other(
                    "Stage graph contains cycles".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Check for cycles starting from a stage
    fn has_cycle<'a>(
        &'a self,
        stage_id: &'a str,
        visited: &mut HashSet<&'a str>,
        recursion_stack: &mut HashSet<&'a str>,
    ) -> bool {
        if recursion_stack.contains(stage_id) {
            return true;
        }

        if visited.contains(stage_id) {
            return false;
        }

        visited.insert(stage_id);
        recursion_stack.insert(stage_id);

        if let Some(stage) = self.stages.get(stage_id) {
            for dep in &stage.dependencies {
                if self.has_cycle(dep, visited, recursion_stack) {
                    return true;
                }
            }
        }

        recursion_stack.remove(stage_id);
        false
    }
}

/// Orchestrator for executing chapter processing pipelines
#[derive(Clone)]
pub struct ChapterOrchestrator {
    extractor: Arc<ImageExtractor>,
    ocr: Arc<OcrProcessor>,
    markdown: Arc<MarkdownGenerator>,
    assembler: Arc<ManualAssembler>,
    /// Active stage graphs keyed by chapter
    graphs: Arc<RwLock<HashMap<String, Arc<Mutex<StageGraph>>>>>,
}

impl ChapterOrchestrator {
    /// Create an orchestrator wired to the given storage and model adapters
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn OcrEngine>,
        generator: Arc<dyn TextGenerator>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            extractor: Arc::new(ImageExtractor::new(store.clone(), publisher.clone())),
            ocr: Arc::new(OcrProcessor::new(store.clone(), engine, publisher.clone())),
            markdown: Arc::new(MarkdownGenerator::new(
                store.clone(),
                generator.clone(),
                publisher.clone(),
            )),
            assembler: Arc::new(ManualAssembler::new(store, generator, publisher)),
            graphs: Arc::new(RwLock::new(HashMap::with_capacity(10))), // Typical ~10 concurrent chapters
        }
    }

    /// Build the full processing graph for one staged chapter
    #[must_use]
    pub fn build_chapter_graph(
        &self,
        chapter: String,
        bucket: String,
        document_key: String,
    ) -> StageGraph {
        let mut graph = StageGraph::new(chapter, bucket, document_key);

        // Root: image extraction from the staged archive
        graph.add_stage(
            "image_extraction".to_string(),
            StageType::ImageExtraction,
            vec![],
        );

        // OCR reads the extracted images
        graph.add_stage(
            "ocr".to_string(),
            StageType::Ocr,
            vec!["image_extraction".to_string()],
        );

        // Markdown generation reads the OCR text files
        graph.add_stage(
            "markdown_generation".to_string(),
            StageType::MarkdownGeneration,
            vec!["ocr".to_string()],
        );

        // Assembly combines the generated steps
        graph.add_stage(
            "assembly".to_string(),
            StageType::Assembly,
            vec!["markdown_generation".to_string()],
        );

        graph
    }

    /// Build a graph running only the given stages
    ///
    /// Included stages are chained in pipeline order, each depending on the
    /// previous included one. Unknown duplicates are collapsed by the order
    /// filter.
    #[must_use]
    pub fn build_stage_graph(
        &self,
        chapter: String,
        bucket: String,
        document_key: String,
        stages: &[StageType],
    ) -> StageGraph {
        let mut graph = StageGraph::new(chapter, bucket, document_key);

        let mut previous: Option<String> = None;
        for stage_type in StageType::pipeline_order() {
            if !stages.contains(&stage_type) {
                continue;
            }
            let id = stage_type.name().to_string();
            let dependencies = match &previous {
                Some(prev) => vec![prev.clone()],
                None => vec![],
            };
            graph.add_stage(id.clone(), stage_type, dependencies);
            previous = Some(id);
        }

        graph
    }

    /// Execute a stage graph
    pub async fn execute(&self, graph: StageGraph) -> Result<StageGraph> {
        let chapter = graph.chapter.clone();
        info!("Starting execution of chapter: {}", chapter);

        // Validate graph
        graph.validate()?;

        // Store graph
        let graph = Arc::new(Mutex::new(graph));
        {
            let mut graphs = self.graphs.write().await;
            graphs.insert(chapter.clone(), graph.clone());
        }

        // Execute stages
        loop {
            let ready_stages = {
                let g = graph.lock().await;
                if g.is_complete() {
                    if g.has_failed() {
                        warn!(
                            "Chapter {} completed with {} failed stages",
                            chapter,
                            g.failed_stages().len()
                        );
                    } else {
                        info!("Chapter {} completed successfully", chapter);
                    }
                    break;
                }
                g.get_ready_stages()
            };

            if ready_stages.is_empty() {
                // Dependents of a failed stage can never become ready; fail
                // them now instead of polling forever
                let blocked = {
                    let mut g = graph.lock().await;
                    g.fail_blocked_stages()
                };
                if blocked == 0 {
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
                continue;
            }

            // Execute ready stages in parallel
            let mut handles = Vec::with_capacity(ready_stages.len());
            for stage_id in ready_stages {
                let orchestrator = self.clone();
                let graph_clone = graph.clone();
                let handle = tokio::spawn(async move {
                    orchestrator.execute_stage(graph_clone, stage_id).await;
                });
                handles.push(handle);
            }

            // Wait for all stages to complete
            for handle in handles {
                let _ = handle.await;
            }
        }

        // Return completed graph
        let final_graph = {
            let g = graph.lock().await;
            g.clone()
        };

        Ok(final_graph)
    }

    /// Execute a single stage
    async fn execute_stage(&self, graph: Arc<Mutex<StageGraph>>, stage_id: String) {
        // Get stage info
        let (stage_type, bucket, document_key, chapter) = {
            let mut g = graph.lock().await;
            g.mark_running(&stage_id);
            if let Some(stage) = g.stages.get(&stage_id) {
                (
                    stage.stage_type.clone(),
                    g.bucket.clone(),
                    g.document_key.clone(),
                    g.chapter.clone(),
                )
            } else {
                error!("Stage {} not found in graph", stage_id);
                g.mark_failed(&stage_id, format!("Stage not found in graph: {stage_id}"));
                return;
            }
        };

        info!("Executing stage: {} ({})", stage_id, stage_type.name());

        // Execute stage based on type
        let result = self
            .execute_stage_type(&stage_type, &bucket, &document_key, &chapter)
            .await;

        // Update stage state
        let mut g = graph.lock().await;
        match result {
            Ok(stage_result) => {
                info!("Stage {} completed successfully", stage_id);
                g.mark_completed(&stage_id, stage_result);
            }
            Err(e) => {
                error!("Stage {} failed: {}", stage_id, e);
                g.mark_failed(&stage_id, e.to_string());
            }
        }
    }

    /// Execute a specific stage type
    async fn execute_stage_type(
        &self,
        stage_type: &StageType,
        bucket: &str,
        document_key: &str,
        chapter: &str,
    ) -> Result<StageResult> {
        match stage_type {
            StageType::ImageExtraction => {
                let summary = self
                    .extractor
                    .extract_chapter(bucket, document_key, chapter)
                    .await?;
                info!(
                    "Extracted {}/{} images for chapter {}",
                    summary.images_uploaded, summary.images_found, chapter
                );
                Ok(StageResult::ImageExtraction(summary))
            }
            StageType::Ocr => {
                let summary = self.ocr.process_chapter(bucket, chapter).await?;
                info!(
                    "Analyzed {}/{} images for chapter {}",
                    summary.images_processed, summary.images_found, chapter
                );
                Ok(StageResult::Ocr(summary))
            }
            StageType::MarkdownGeneration => {
                let summary = self.markdown.generate_chapter(bucket, chapter).await?;
                info!(
                    "Generated {}/{} steps for chapter {}",
                    summary.steps_written, summary.steps_found, chapter
                );
                Ok(StageResult::MarkdownGeneration(summary))
            }
            StageType::Assembly => {
                let summary = self.assembler.assemble_chapter(bucket, chapter).await?;
                info!(
                    "Assembled {} steps into final manual for chapter {}",
                    summary.steps_combined, chapter
                );
                Ok(StageResult::Assembly(summary))
            }
        }
    }

    /// Get status of a chapter's pipeline
    pub async fn chapter_status(&self, chapter: &str) -> Option<StageGraphStatus> {
        let graphs = self.graphs.read().await;
        if let Some(graph) = graphs.get(chapter) {
            let g = graph.lock().await;
            Some(StageGraphStatus {
                chapter: g.chapter.clone(),
                total_stages: g.stages.len(),
                completed_stages: g.completed.len(),
                failed_stages: g.failed.len(),
                is_complete: g.is_complete(),
                has_failed: g.has_failed(),
            })
        } else {
            None
        }
    }
}

/// Status of a stage graph execution
#[derive(Debug, Clone, Serialize)]
pub struct StageGraphStatus {
    pub chapter: String,
    pub total_stages: usize,
    pub completed_stages: usize,
    pub failed_stages: usize,
    pub is_complete: bool,
    pub has_failed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    use doc_pipeline_events::MemoryPublisher;
    use doc_pipeline_markdown::MemoryGenerator;
    use doc_pipeline_ocr::{MemoryOcrEngine, OcrLine};
    use doc_pipeline_storage::MemoryObjectStore;

    fn orchestrator_with_fakes() -> (
        ChapterOrchestrator,
        Arc<MemoryObjectStore>,
        Arc<MemoryOcrEngine>,
        Arc<MemoryPublisher>,
    ) {
        let store = Arc::new(MemoryObjectStore::new());
        let engine = Arc::new(MemoryOcrEngine::new());
        let generator = Arc::new(MemoryGenerator::new());
        let publisher = Arc::new(MemoryPublisher::new());
        let orchestrator = ChapterOrchestrator::new(
            store.clone(),
            engine.clone(),
            generator,
            publisher.clone(),
        );
        (orchestrator, store, engine, publisher)
    }

    #[test]
    fn test_stage_creation() {
        let stage = Stage::new(
            "test".to_string(),
            StageType::ImageExtraction,
            vec!["dep1".to_string()],
        );
        assert_eq!(stage.id, "test");
        assert_eq!(stage.stage_type, StageType::ImageExtraction);
        assert_eq!(stage.dependencies.len(), 1);
        assert_eq!(stage.state, StageState::Pending);
    }

    #[test]
    fn test_stage_is_ready() {
        let stage = Stage::new(
            "test".to_string(),
            StageType::Ocr,
            vec!["dep1".to_string()],
        );

        let mut completed = HashSet::new();
        assert!(!stage.is_ready(&completed));

        completed.insert("dep1".to_string());
        assert!(stage.is_ready(&completed));
    }

    #[test]
    fn test_stage_graph_get_ready_stages() {
        let mut graph = StageGraph::new(
            "chapter_1".to_string(),
            "docs".to_string(),
            "staged/chapter_1/j1/source.docx".to_string(),
        );
        graph.add_stage(
            "image_extraction".to_string(),
            StageType::ImageExtraction,
            vec![],
        );
        graph.add_stage(
            "ocr".to_string(),
            StageType::Ocr,
            vec!["image_extraction".to_string()],
        );

        let ready = graph.get_ready_stages();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0], "image_extraction");

        graph.mark_completed(
            "image_extraction",
            StageResult::ImageExtraction(ExtractionSummary {
                chapter: "chapter_1".to_string(),
                images_found: 2,
                images_uploaded: 2,
            }),
        );

        let ready = graph.get_ready_stages();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0], "ocr");
    }

    #[test]
    fn test_stage_graph_validate_missing_dependency() {
        let mut graph = StageGraph::new(
            "chapter_1".to_string(),
            "docs".to_string(),
            "staged/chapter_1/j1/source.docx".to_string(),
        );
        graph.add_stage("ocr".to_string(), StageType::Ocr, vec!["missing".to_string()]);

        let result = graph.validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_stage_graph_validate_cycle() {
        let mut graph = StageGraph::new(
            "chapter_1".to_string(),
            "docs".to_string(),
            "staged/chapter_1/j1/source.docx".to_string(),
        );
        graph.add_stage(
            "stage1".to_string(),
            StageType::ImageExtraction,
            vec!["stage2".to_string()],
        );
        graph.add_stage(
            "stage2".to_string(),
            StageType::Ocr,
            vec!["stage1".to_string()],
        );

        let result = graph.validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_fail_blocked_stages_cascades() {
        let mut graph = StageGraph::new(
            "chapter_1".to_string(),
            "docs".to_string(),
            "staged/chapter_1/j1/source.docx".to_string(),
        );
        graph.add_stage(
            "image_extraction".to_string(),
            StageType::ImageExtraction,
            vec![],
        );
        graph.add_stage(
            "ocr".to_string(),
            StageType::Ocr,
            vec!["image_extraction".to_string()],
        );
        graph.add_stage(
            "markdown_generation".to_string(),
            StageType::MarkdownGeneration,
            vec!["ocr".to_string()],
        );

        graph.mark_failed("image_extraction", "archive unreadable".to_string());

        assert_eq!(graph.fail_blocked_stages(), 1);
        assert_eq!(graph.fail_blocked_stages(), 1);
        assert_eq!(graph.fail_blocked_stages(), 0);

        assert!(graph.is_complete());
        assert_eq!(graph.failed_stages().len(), 3);
        let blocked = &graph.stages()["markdown_generation"];
        assert_eq!(
            blocked.state,
            StageState::Failed("Dependency failed: ocr".to_string())
        );
    }

    #[test]
    fn test_build_chapter_graph() {
        let (orchestrator, _, _, _) = orchestrator_with_fakes();
        let graph = orchestrator.build_chapter_graph(
            "chapter_1".to_string(),
            "docs".to_string(),
            "staged/chapter_1/j1/source.docx".to_string(),
        );

        assert_eq!(graph.chapter, "chapter_1");
        assert!(graph.stages().contains_key("image_extraction"));
        assert!(graph.stages().contains_key("ocr"));
        assert!(graph.stages().contains_key("markdown_generation"));
        assert!(graph.stages().contains_key("assembly"));

        // Verify dependencies
        let ocr = &graph.stages()["ocr"];
        assert_eq!(ocr.dependencies, vec!["image_extraction"]);

        let markdown = &graph.stages()["markdown_generation"];
        assert_eq!(markdown.dependencies, vec!["ocr"]);

        let assembly = &graph.stages()["assembly"];
        assert_eq!(assembly.dependencies, vec!["markdown_generation"]);
    }

    #[test]
    fn test_build_stage_graph_subset() {
        let (orchestrator, _, _, _) = orchestrator_with_fakes();
        let graph = orchestrator.build_stage_graph(
            "chapter_1".to_string(),
            "docs".to_string(),
            "staged/chapter_1/j1/source.docx".to_string(),
            &[StageType::Assembly, StageType::Ocr],
        );

        assert_eq!(graph.stages().len(), 2);
        let ocr = &graph.stages()["ocr"];
        assert!(ocr.dependencies.is_empty());
        let assembly = &graph.stages()["assembly"];
        assert_eq!(assembly.dependencies, vec!["ocr"]);
    }

    #[test]
    fn test_stage_type_name() {
        assert_eq!(StageType::ImageExtraction.name(), "image_extraction");
        assert_eq!(StageType::Ocr.name(), "ocr");
        assert_eq!(StageType::MarkdownGeneration.name(), "markdown_generation");
        assert_eq!(StageType::Assembly.name(), "assembly");
    }

    #[tokio::test]
    async fn test_execute_failed_stage_blocks_dependents() {
        let (orchestrator, _, _, publisher) = orchestrator_with_fakes();

        // No staged document in the store, so image extraction fails
        let graph = orchestrator.build_chapter_graph(
            "chapter_1".to_string(),
            "docs".to_string(),
            "staged/chapter_1/j1/source.docx".to_string(),
        );

        let finished = orchestrator.execute(graph).await.unwrap();

        assert!(finished.is_complete());
        assert!(finished.has_failed());
        assert_eq!(finished.failed_stages().len(), 4);
        assert!(matches!(
            finished.stages()["image_extraction"].state,
            StageState::Failed(_)
        ));
        assert_eq!(
            finished.stages()["ocr"].state,
            StageState::Failed("Dependency failed: image_extraction".to_string())
        );
        assert!(publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_execute_failed_stage_spares_independent_work() {
        let (orchestrator, _, _, _) = orchestrator_with_fakes();

        // Two roots: extraction fails on the missing archive while the
        // independent detection stage still runs to completion
        let mut graph = StageGraph::new(
            "chapter_1".to_string(),
            "docs".to_string(),
            "staged/chapter_1/j1/source.docx".to_string(),
        );
        graph.add_stage(
            "image_extraction".to_string(),
            StageType::ImageExtraction,
            vec![],
        );
        graph.add_stage("ocr".to_string(), StageType::Ocr, vec![]);
        graph.add_stage(
            "markdown_generation".to_string(),
            StageType::MarkdownGeneration,
            vec!["image_extraction".to_string()],
        );

        let finished = orchestrator.execute(graph).await.unwrap();

        assert!(finished.is_complete());
        assert!(finished.completed_stages().contains("ocr"));
        assert_eq!(finished.failed_stages().len(), 2);
        assert!(finished.failed_stages().contains("image_extraction"));
        assert!(finished.failed_stages().contains("markdown_generation"));
    }

    #[tokio::test]
    async fn test_execute_runs_stages_in_dependency_order() {
        let (orchestrator, store, engine, publisher) = orchestrator_with_fakes();

        // Start from already extracted images and run the remaining stages
        store
            .put_object(
                "docs",
                "extracted-images/chapter_1/image_1.png",
                b"png bytes",
                "image/png",
            )
            .await
            .unwrap();
        engine
            .set_lines(
                "extracted-images/chapter_1/image_1.png",
                vec![
                    OcrLine {
                        text: "Open the console".to_string(),
                        top: 0.1,
                    },
                    OcrLine {
                        text: "Click Next".to_string(),
                        top: 0.4,
                    },
                ],
            )
            .await;

        let graph = orchestrator.build_stage_graph(
            "chapter_1".to_string(),
            "docs".to_string(),
            "staged/chapter_1/j1/source.docx".to_string(),
            &[
                StageType::Ocr,
                StageType::MarkdownGeneration,
                StageType::Assembly,
            ],
        );

        let finished = orchestrator.execute(graph).await.unwrap();

        assert!(finished.is_complete());
        assert!(!finished.has_failed());
        assert_eq!(finished.completed_stages().len(), 3);

        match finished.get_result("assembly") {
            Some(StageResult::Assembly(summary)) => {
                assert_eq!(summary.steps_combined, 1);
                assert_eq!(
                    summary.final_key.as_deref(),
                    Some("final-output/chapter_1.md")
                );
            }
            other => panic!("Unexpected assembly result: {other:?}"),
        }

        assert!(store.contains("docs", "ocr-text/chapter_1/image_1.txt").await);
        assert!(store.contains("docs", "markdown/chapter_1/image_1.md").await);
        assert!(store.contains("docs", "final-output/chapter_1.md").await);

        // One event per stage that produced output
        assert_eq!(publisher.published().await.len(), 3);

        let status = orchestrator.chapter_status("chapter_1").await.unwrap();
        assert!(status.is_complete);
        assert!(!status.has_failed);
        assert_eq!(status.completed_stages, 3);
    }
}
