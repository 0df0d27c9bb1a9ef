mod context_tests;
mod lang_tests;
mod reader_tests;
