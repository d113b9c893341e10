mod broker_tests;
mod retry_tests;
mod support;
