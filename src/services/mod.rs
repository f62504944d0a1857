pub mod ai_client;
pub mod diagram_files;
pub mod generation_orchestrator;
pub mod generation_status;
pub mod generation_watchdog;
pub mod prompt_builder;
pub mod response_processor;
pub mod status_poller;

#[cfg(test)]
pub mod test_support;
