mod chain_test;
