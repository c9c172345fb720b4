//! End-to-end runs of hand-written assembly against input streams.

use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

use xfer_vm::{Status, Vm};

fn run(code: &str, input: &str) -> String {
    let mut vm = Vm::from_code_text(code).expect("code header");
    vm.set_input_text(input);
    vm.set_output_buffer();
    vm.run().expect("run");
    assert_eq!(vm.status(), Status::Halted);
    vm.take_output()
}

const EMPTY_TRANSFER_LU: &str = "\
#<assembly>
#<transfer default=\"lu\">
jmp section_rules_start
patterns_start:
patterns_end:
section_rules_start:
section_rules_end:
";

#[test]
fn transfer_rule_rewrites_matched_window() {
    let code = "\
#<assembly>
#<transfer default=\"lu\">
jmp section_rules_start
patterns_start:
push-str \"<det>\"
push-str \"<n>\"
push-int 2
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-int 1
push-str whole
cliptl
lu 1
pushbl
push-int 2
push-str whole
cliptl
lu 1
out 3
action_0_end:
section_rules_end:
";
    let output = run(code, "^the<det>/el<det>$ ^cat<n>/gat<n>$");
    assert_eq!(output, "^el<det>$ ^gat<n>$");
}

#[test]
fn transfer_unmatched_word_defaults_to_target_lu() {
    let output = run(EMPTY_TRANSFER_LU, "^foo<n>/bar<n>$");
    assert_eq!(output, "^bar<n>$");
}

#[test]
fn transfer_unmatched_empty_target_emits_nothing() {
    let output = run(EMPTY_TRANSFER_LU, "^foo<n>/$");
    assert_eq!(output, "");
}

#[test]
fn transfer_chunk_default_wraps_unknown_words() {
    let code = "\
#<assembly>
#<transfer default=\"chunk\">
jmp section_rules_start
patterns_start:
patterns_end:
section_rules_start:
section_rules_end:
";
    let output = run(code, "^x<n>/*y$");
    assert_eq!(output, "^unknown<unknown>{^*y$}$");

    let output = run(code, "^x<n>/y<n>$");
    assert_eq!(output, "^default<default>{^y<n>$}$");
}

#[test]
fn interchunk_rule_reemits_chunk() {
    let code = "\
#<assembly>
#<interchunk>
jmp section_rules_start
patterns_start:
push-str \"NP<SN>\"
push-int 1
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-int 1
push-str whole
clip
lu 1
out 1
action_0_end:
section_rules_end:
";
    let output = run(code, "^NP<SN>{^el<det>$ ^gat<n>$}$");
    assert_eq!(output, "^NP<SN>{^el<det>$ ^gat<n>$}$");
}

#[test]
fn interchunk_unmatched_chunk_passes_through() {
    let code = "\
#<assembly>
#<interchunk>
jmp section_rules_start
patterns_start:
patterns_end:
section_rules_start:
section_rules_end:
";
    let output = run(code, "^NP<SN>{^el<det>$}$\n");
    assert_eq!(output, "^NP<SN>{^el<det>$}$\n");
}

#[test]
fn lrlm_prefers_the_longer_match() {
    let code = "\
#<assembly>
#<transfer default=\"lu\">
jmp section_rules_start
patterns_start:
push-str \"a<x>\"
push-int 1
addtrie action_3_start
push-str \"a<x>\"
push-str \"b<y>\"
push-int 2
addtrie action_1_start
patterns_end:
section_rules_start:
action_1_start:
push-str RULE1
out 1
action_1_end:
action_3_start:
push-str RULE3
out 1
action_3_end:
section_rules_end:
";
    // Two-word window: the longer pattern (rule 1) wins.
    assert_eq!(run(code, "^A<x>/a$ ^B<y>/b$"), "RULE1");
    // One-word window only: rule 3 fires, the second word defaults.
    assert_eq!(run(code, "^A<x>/a$ ^C<y>/c$"), "RULE3 ^c$");
}

#[test]
fn postchunk_rule_sees_inner_units() {
    let code = "\
#<assembly>
#<postchunk>
jmp section_rules_start
patterns_start:
push-str \"np\"
push-int 1
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-int 1
push-str whole
clip
lu 1
pushsb 1
push-int 2
push-str whole
clip
lu 1
out 3
action_0_end:
section_rules_end:
";
    let output = run(code, "^np<SN>{^el<det>$ ^gat<n>$}$\n");
    assert_eq!(output, "^el<det>$ ^gat<n>$\n");
}

#[test]
fn postchunk_unmatched_chunk_spills_its_content() {
    let code = "\
#<assembly>
#<postchunk>
jmp section_rules_start
patterns_start:
patterns_end:
section_rules_start:
section_rules_end:
";
    let output = run(code, "^np<SN>{^el<det>$ ^gat<n>$}$\n");
    assert_eq!(output, "^el<det>$ ^gat<n>$\n");
}

#[test]
fn postchunk_references_and_case_apply_before_rules() {
    let code = "\
#<assembly>
#<postchunk>
jmp section_rules_start
patterns_start:
patterns_end:
section_rules_start:
section_rules_end:
";
    // <2> resolves to the chunk's second tag; the capitalized
    // pseudolemma capitalizes the first inner lemma.
    let output = run(code, "^Np<SN><pl>{^gat<n><2>$}$\n");
    assert_eq!(output, "^Gat<n><pl>$\n");
}

#[test]
fn variables_initialize_and_flow_through_conditions() {
    let code = "\
#<assembly>
#<transfer default=\"lu\">
push-str mood
push-str happy
storev
jmp section_rules_start
patterns_start:
push-str \"<n>\"
push-int 1
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-var mood
push-str happy
cmp
jz when_0_end
push-str YES
out 1
jmp choose_0_end
when_0_end:
push-str NO
out 1
choose_0_end:
action_0_end:
section_rules_end:
";
    assert_eq!(run(code, "^cat<n>/gat<n>$"), "YES");
}

#[test]
fn macros_remap_word_positions() {
    let code = "\
#<assembly>
#<transfer default=\"lu\">
jmp section_rules_start
patterns_start:
push-str \"<det>\"
push-str \"<n>\"
push-int 2
addtrie action_0_start
patterns_end:
macro_emit_lemma_start:
push-int 1
push-str lem
clip
lu 1
out 1
macro_emit_lemma_end: ret
section_rules_start:
action_0_start:
push-int 2
push-int 1
call emit_lemma
action_0_end:
section_rules_end:
";
    // The macro's local word 1 is the rule's word 2.
    assert_eq!(run(code, "^the<det>/el<det>$ ^cat<n>/gat<n>$"), "^cat$");
}

#[test]
fn storecl_rewrites_a_tag_by_alternation() {
    let code = "\
#<assembly>
#<transfer default=\"lu\">
jmp section_rules_start
patterns_start:
push-str \"<n>\"
push-int 1
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-int 1
push-str <sg>|<pl>
push-str <du>
storecl
push-int 1
push-str whole
clip
lu 1
out 1
action_0_end:
section_rules_end:
";
    assert_eq!(run(code, "^cat<n><pl>/gat<n><pl>$"), "^cat<n><du>$");
}

#[test]
fn superblanks_surround_every_word() {
    let output = run(
        EMPTY_TRANSFER_LU,
        "[head] ^a<n>/x<n>$ [mid] ^b<n>/y<n>$ [tail]\n",
    );
    assert_eq!(output, "[head] ^x<n>$ [mid] ^y<n>$ [tail]");
}

#[test]
fn chunk_builds_wrap_content_in_transfer() {
    let code = "\
#<assembly>
#<transfer default=\"chunk\">
jmp section_rules_start
patterns_start:
push-str \"<n>\"
push-int 1
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-str NP
push-str <SN>
push-int 1
push-str whole
cliptl
lu 1
chunk 3
out 1
action_0_end:
section_rules_end:
";
    assert_eq!(run(code, "^cat<n>/gat<n>$"), "^NP<SN>{^gat<n>$}$");
}

#[test]
fn mlu_joins_units_into_a_multiword() {
    let code = "\
#<assembly>
#<transfer default=\"lu\">
jmp section_rules_start
patterns_start:
push-str \"<n>\"
push-int 1
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-int 1
push-str whole
cliptl
lu 1
push-str se<prn>
lu 1
mlu 2
out 1
action_0_end:
section_rules_end:
";
    assert_eq!(run(code, "^ir<n>/anar<n>$"), "^anar<n>+se<prn>$");
}

#[test]
fn append_and_case_ops_compose() {
    let code = "\
#<assembly>
#<transfer default=\"lu\">
push-str acc
push-str
storev
jmp section_rules_start
patterns_start:
push-str \"<n>\"
push-int 1
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-str acc
push-int 1
push-str lem
clip
push-str aa
modify-case
append 1
push-var acc
case-of
out 1
push-var acc
push-int 1
get-case-from
modify-case
out 1
action_0_end:
section_rules_end:
";
    // The lowercased source lemma lands in the variable; case-of
    // reports aa, then get-case-from restores the original Aa case.
    assert_eq!(run(code, "^Cat<n>/gat<n>$"), "aaCat");
}

#[test]
fn string_predicates_drive_jumps() {
    let code = "\
#<assembly>
#<transfer default=\"lu\">
jmp section_rules_start
patterns_start:
push-str \"<n>\"
push-int 1
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-int 1
push-str lem
clip
push-str ca|co
begins-with
push-int 1
push-str lem
clip
push-str cat|dog
in
and 2
jz when_0_end
push-str BOTH
out 1
jmp choose_0_end
when_0_end:
push-str MISS
out 1
choose_0_end:
action_0_end:
section_rules_end:
";
    assert_eq!(run(code, "^cat<n>/gat<n>$"), "BOTH");
    assert_eq!(run(code, "^cow<n>/vaca<n>$"), "MISS");
}

#[test]
fn type_misuse_fails_the_run() {
    let code = "\
#<assembly>
#<transfer default=\"lu\">
jmp section_rules_start
patterns_start:
push-str \"<n>\"
push-int 1
addtrie action_0_start
patterns_end:
section_rules_start:
action_0_start:
push-str notanumber
push-str whole
clip
action_0_end:
section_rules_end:
";
    let mut vm = Vm::from_code_text(code).unwrap();
    vm.set_input_text("^cat<n>/gat<n>$");
    vm.set_output_buffer();
    assert!(vm.run().is_err());
    assert_eq!(vm.status(), Status::Failed);
}

#[test]
fn bad_header_is_rejected() {
    assert!(Vm::from_code_text("#<bytecode>\n#<transfer>\n").is_err());
    assert!(Vm::from_code_text("#<assembly>\n#<frobnicate>\n").is_err());
}

#[test]
fn code_input_and_output_round_trip_through_files() {
    let mut code_file = NamedTempFile::new().unwrap();
    code_file.write_all(EMPTY_TRANSFER_LU.as_bytes()).unwrap();

    let mut input_file = NamedTempFile::new().unwrap();
    input_file.write_all(b"^foo<n>/bar<n>$\n").unwrap();

    let output_dir = tempfile::tempdir().unwrap();
    let output_path = output_dir.path().join("output.txt");

    let mut vm = Vm::from_code_file(code_file.path()).unwrap();
    vm.set_input_file(input_file.path());
    vm.set_output_file(&output_path).unwrap();
    vm.run().unwrap();
    assert_eq!(vm.status(), Status::Halted);

    let output = fs::read_to_string(&output_path).unwrap();
    assert_eq!(output, "^bar<n>$\n");
}

#[test]
fn missing_code_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Vm::from_code_file(&dir.path().join("nowhere.asm")).is_err());
}
