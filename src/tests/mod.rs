mod live_api_tests;
