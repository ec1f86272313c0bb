mod integration {
    pub mod common;

    mod page_repository_tests;
    mod run_repository_tests;
}
