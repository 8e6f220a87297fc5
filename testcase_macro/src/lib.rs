// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// The macro for labeling migration verification testcases.
///
/// Testcase functions have the signature `fn test(ctx:
/// &mvt_testcase::Framework)`. The macro inserts the function body into a
/// wrapper function that returns an `mvt_testcase::TestOutcome` and creates an
/// entry in the test case inventory that allows the runner to enumerate the
/// test.
#[proc_macro_attribute]
pub fn mvt_testcase(_attrib: TokenStream, input: TokenStream) -> TokenStream {
    let item_fn = parse_macro_input!(input as ItemFn);

    // Build the inventory record for this test. The `module_path!()` in the
    // generated code allows the test case to report the fully-qualified path to
    // itself regardless of where it's located.
    let fn_ident = item_fn.sig.ident.clone();
    let fn_name = fn_ident.to_string();
    let submit: proc_macro2::TokenStream = quote! {
        mvt_testcase::inventory_submit! {
            mvt_testcase::TestCase::new(
                module_path!(),
                #fn_name,
                mvt_testcase::TestFunction { f: #fn_ident }
            )
        }
    };

    // Rebuild the test body into an immediately-executed function that returns
    // an `anyhow::Result`. This allows tests to use the `?` operator and to
    // `return Ok(())` to allow a test to pass early. A `TestSkippedError` in
    // the error chain marks the test as skipped rather than failed.
    let fn_vis = item_fn.vis.clone();
    let fn_sig = item_fn.sig.clone();
    let fn_block = item_fn.block;
    let remade_fn = quote! {
        #fn_vis #fn_sig -> TestOutcome {
            match || -> mvt_testcase::Result<()> {
                #fn_block
                Ok(())
            }(){
                Ok(()) => mvt_testcase::TestOutcome::Passed,
                Err(e) => match e.downcast_ref::<mvt_testcase::TestSkippedError>()
                {
                    Some(mvt_testcase::TestSkippedError::TestSkipped(msg)) => {
                        mvt_testcase::TestOutcome::Skipped(msg.clone())
                    }
                    None => {
                        let msg = format!("{}\n    error backtrace: {}",
                                          e.to_string(),
                                          e.backtrace());
                        mvt_testcase::TestOutcome::Failed(Some(msg))
                    }
                }
            }
        }
    };

    quote! {
        #remade_fn

        #submit
    }
    .into()
}
