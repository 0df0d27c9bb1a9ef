mod jsdoc_tests;
mod typish_tests;
