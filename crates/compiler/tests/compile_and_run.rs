//! Compile rule markup and execute the result on the VM.

use std::io::Write;

use tempfile::NamedTempFile;

use xfer_vm::Vm;

fn compile_and_run(markup: &str, input: &str) -> String {
    let assembly = xfer_compiler::compile(markup.as_bytes()).expect("compile");
    let mut vm = Vm::from_code_text(&assembly).expect("assembly header");
    vm.set_input_text(input);
    vm.set_output_buffer();
    vm.run().expect("run");
    vm.take_output()
}

#[test]
fn transfer_rule_reorders_nothing_but_rewrites_targets() {
    let markup = r#"
<transfer default="lu">
  <section-def-cats>
    <def-cat n="det"><cat-item tags="det"/></def-cat>
    <def-cat n="nom"><cat-item tags="n"/></def-cat>
  </section-def-cats>
  <section-rules>
    <rule>
      <pattern>
        <pattern-item n="det"/>
        <pattern-item n="nom"/>
      </pattern>
      <action>
        <out>
          <lu><clip pos="1" side="tl" part="whole"/></lu>
          <b/>
          <lu><clip pos="2" side="tl" part="whole"/></lu>
        </out>
      </action>
    </rule>
  </section-rules>
</transfer>
"#;
    let output = compile_and_run(markup, "^the<det>/el<det>$ ^cat<n>/gat<n>$");
    assert_eq!(output, "^el<det>$ ^gat<n>$");
}

#[test]
fn choose_and_macro_flow_through_the_vm() {
    let markup = r#"
<transfer default="lu">
  <section-def-cats>
    <def-cat n="nom"><cat-item tags="n"/></def-cat>
  </section-def-cats>
  <section-def-macros>
    <def-macro n="flag" npar="1">
      <choose>
        <when>
          <test>
            <equal>
              <clip pos="1" side="sl" part="lem"/>
              <lit v="cat"/>
            </equal>
          </test>
          <out><lit v="FELINE"/></out>
        </when>
        <otherwise>
          <out><lit v="OTHER"/></out>
        </otherwise>
      </choose>
    </def-macro>
  </section-def-macros>
  <section-rules>
    <rule>
      <pattern><pattern-item n="nom"/></pattern>
      <action>
        <call-macro n="flag"><with-param pos="1"/></call-macro>
      </action>
    </rule>
  </section-rules>
</transfer>
"#;
    assert_eq!(compile_and_run(markup, "^cat<n>/gat<n>$"), "FELINE");
    assert_eq!(compile_and_run(markup, "^dog<n>/gos<n>$"), "OTHER");
}

#[test]
fn chunk_rule_builds_a_chunk_with_clipped_tags() {
    let markup = r#"
<transfer default="chunk">
  <section-def-cats>
    <def-cat n="nom"><cat-item tags="n.*"/></def-cat>
  </section-def-cats>
  <section-def-attrs>
    <def-attr n="gen"><attr-item tags="m"/><attr-item tags="f"/></def-attr>
  </section-def-attrs>
  <section-rules>
    <rule>
      <pattern><pattern-item n="nom"/></pattern>
      <action>
        <out>
          <chunk name="nom">
            <tags>
              <tag><lit-tag v="SN"/></tag>
              <tag><clip pos="1" side="tl" part="gen"/></tag>
            </tags>
            <lu><clip pos="1" side="tl" part="whole"/></lu>
          </chunk>
        </out>
      </action>
    </rule>
  </section-rules>
</transfer>
"#;
    let output = compile_and_run(markup, "^cat<n><f>/gat<n><f>$");
    assert_eq!(output, "^nom<SN><f>{^gat<n><f>$}$");
}

#[test]
fn interchunk_link_to_emits_reference_tags() {
    let markup = r#"
<interchunk>
  <section-def-cats>
    <def-cat n="np"><cat-item lemma="nom" tags="SN.*"/></def-cat>
  </section-def-cats>
  <section-def-attrs>
    <def-attr n="gen"><attr-item tags="m"/><attr-item tags="f"/></def-attr>
  </section-def-attrs>
  <section-rules>
    <rule>
      <pattern><pattern-item n="np"/></pattern>
      <action>
        <out>
          <chunk name="NP">
            <tags>
              <tag><clip pos="1" part="gen" link-to="1"/></tag>
            </tags>
            <clip pos="1" part="chcontent"/>
          </chunk>
        </out>
      </action>
    </rule>
  </section-rules>
</interchunk>
"#;
    // The chunk's gen tag is replaced by a <1> reference; the content
    // travels unchanged (interchunk chunks keep their braces).
    let output = compile_and_run(markup, "^nom<SN><f>{^gat<n><f>$}$");
    assert_eq!(output, "^NP<1>{^gat<n><f>$}$");
}

#[test]
fn postchunk_rule_reads_inner_units() {
    let markup = r#"
<postchunk>
  <section-def-cats>
    <def-cat n="np"><cat-item lemma="nom"/></def-cat>
  </section-def-cats>
  <section-rules>
    <rule>
      <pattern><pattern-item n="np"/></pattern>
      <action>
        <out>
          <lu><clip pos="1" part="whole"/></lu>
          <b pos="1"/>
          <lu><clip pos="2" part="whole"/></lu>
        </out>
      </action>
    </rule>
  </section-rules>
</postchunk>
"#;
    let output = compile_and_run(markup, "^nom<SN>{^el<det>$ ^gat<n>$}$\n");
    assert_eq!(output, "^el<det>$ ^gat<n>$\n");
}

#[test]
fn compile_file_reads_rules_from_disk() {
    let markup = r#"
<transfer default="lu">
  <section-def-cats>
    <def-cat n="nom"><cat-item tags="n"/></def-cat>
  </section-def-cats>
  <section-rules>
    <rule>
      <pattern><pattern-item n="nom"/></pattern>
      <action>
        <out>
          <lu><clip pos="1" side="tl" part="whole"/></lu>
        </out>
      </action>
    </rule>
  </section-rules>
</transfer>
"#;
    let mut rules_file = NamedTempFile::new().unwrap();
    rules_file.write_all(markup.as_bytes()).unwrap();

    let assembly = xfer_compiler::compile_file(rules_file.path()).unwrap();
    let mut vm = Vm::from_code_text(&assembly).unwrap();
    vm.set_input_text("^cat<n>/gat<n>$");
    vm.set_output_buffer();
    vm.run().unwrap();
    assert_eq!(vm.take_output(), "^gat<n>$");
}

#[test]
fn compile_file_reports_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    assert!(xfer_compiler::compile_file(&dir.path().join("nowhere.t1x")).is_err());
}

#[test]
fn variables_persist_across_rules() {
    let markup = r#"
<transfer default="lu">
  <section-def-cats>
    <def-cat n="nom"><cat-item tags="n"/></def-cat>
  </section-def-cats>
  <section-def-vars>
    <def-var n="seen" v="no"/>
  </section-def-vars>
  <section-rules>
    <rule>
      <pattern><pattern-item n="nom"/></pattern>
      <action>
        <out><var n="seen"/></out>
        <let><var n="seen"/><lit v="yes"/></let>
      </action>
    </rule>
  </section-rules>
</transfer>
"#;
    let output = compile_and_run(markup, "^a<n>/a<n>$ ^b<n>/b<n>$");
    assert_eq!(output, "no yes");
}
